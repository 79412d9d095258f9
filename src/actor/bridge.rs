//! Scheduling bridge for threads this crate does not drive.
//!
//! A render thread driven by an external host (a GPU callback loop, a
//! platform compositor) has no [`RunLoop`](crate::runloop::RunLoop) to ride.
//! The [`HostBridge`] implements the [`Scheduler`] contract for such a
//! thread by asking the host to invoke a drain callback "soon" on it.
//!
//! State machine: Idle → (`schedule`) → PendingHostCallback → (host invokes
//! the callback) → drain queued mailboxes → Idle, or straight back to
//! PendingHostCallback when a drained mailbox still holds envelopes and
//! re-enters through `schedule`.
//!
//! The drain callback captures only a weak bridge reference, and delivery
//! resolves weak mailbox references; a bridge or actor destroyed before the
//! host fires is a no-op, so teardown needs no extra bookkeeping.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::actor::mailbox::Mailbox;
use crate::actor::scheduler::Scheduler;

/// A drain request handed to the host runtime.
pub type HostCallback = Box<dyn FnOnce() + Send>;

/// The external runtime controlling a thread on this crate's behalf.
///
/// `request_callback` must arrange for `callback` to be invoked on the
/// bridged thread soon; it may be called from any thread and must not
/// invoke the callback synchronously on the caller.
pub trait HostRuntime: Send + Sync {
    /// Asks the host to invoke `callback` on the bridged thread.
    fn request_callback(&self, callback: HostCallback);
}

/// [`Scheduler`] for a thread owned by an external host runtime.
pub struct HostBridge {
    host: Arc<dyn HostRuntime>,
    queued: Mutex<VecDeque<Weak<Mailbox>>>,
    /// True from `schedule` until the host callback begins draining.
    pending: AtomicBool,
    weak_self: Weak<HostBridge>,
}

impl HostBridge {
    /// Creates a bridge that requests delivery through `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HostRuntime>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            host,
            queued: Mutex::new(VecDeque::new()),
            pending: AtomicBool::new(false),
            weak_self: weak.clone(),
        })
    }

    fn drain(&self) {
        // Clear first: a mailbox re-scheduling from inside the drain must
        // trigger a fresh host callback.
        self.pending.store(false, Ordering::Release);
        let batch: Vec<Weak<Mailbox>> = {
            let mut queued = self.queued.lock().expect("bridge queue poisoned");
            queued.drain(..).collect()
        };
        for mailbox in batch {
            Mailbox::maybe_receive(&mailbox);
        }
    }
}

impl Scheduler for HostBridge {
    fn schedule(&self, mailbox: Weak<Mailbox>) {
        self.queued
            .lock()
            .expect("bridge queue poisoned")
            .push_back(mailbox);
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("requesting host callback");
        let bridge = self.weak_self.clone();
        self.host.request_callback(Box::new(move || {
            if let Some(bridge) = bridge.upgrade() {
                bridge.drain();
            }
        }));
    }
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field(
                "queued",
                &self.queued.lock().expect("bridge queue poisoned").len(),
            )
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}
