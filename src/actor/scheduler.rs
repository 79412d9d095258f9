//! The seam between mailboxes and the thread that drains them.
//!
//! A [`Scheduler`] knows how to get [`Mailbox::maybe_receive`] invoked on
//! its owning thread "soon". Three strategies implement it:
//!
//! - [`LoopHandle`]: a thread driven by this crate's own run loop — delivery
//!   rides the loop as an immediate runnable;
//! - [`ThreadPool`](crate::pool::ThreadPool): a shared pool of background
//!   worker threads;
//! - [`HostBridge`](crate::actor::HostBridge): a thread owned by an external
//!   host runtime (for example a GPU-callback-driven render thread).
//!
//! Mailbox, signal, and timer contracts are identical regardless of which
//! strategy backs the owning thread.

use std::sync::{Arc, Weak};

use crate::actor::mailbox::Mailbox;
use crate::runloop::{LoopHandle, Runnable};
use crate::time::Deadline;

/// Schedules delivery for a mailbox on the thread this scheduler stands for.
///
/// `schedule` must be callable from any thread and must tolerate the mailbox
/// dying before delivery runs: the weak reference is resolved (or not) at
/// delivery time, never at scheduling time.
pub trait Scheduler: Send + Sync {
    /// Requests that `Mailbox::maybe_receive(&mailbox)` run on the owning
    /// thread soon.
    fn schedule(&self, mailbox: Weak<Mailbox>);
}

impl Scheduler for LoopHandle {
    fn schedule(&self, mailbox: Weak<Mailbox>) {
        self.add_runnable(Arc::new(DeliveryTask { mailbox }));
    }
}

/// Trampoline that carries a pending delivery through a run loop.
struct DeliveryTask {
    mailbox: Weak<Mailbox>,
}

impl Runnable for DeliveryTask {
    fn due_time(&self) -> Deadline {
        Deadline::Immediate
    }

    fn run_task(&self) {
        Mailbox::maybe_receive(&self.mailbox);
    }
}
