//! Thread-safe inbox of closures for one logical actor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::actor::scheduler::Scheduler;

/// A closure destined for an actor's owning thread.
pub type Envelope = Box<dyn FnOnce() + Send>;

/// Upper bound on envelopes delivered per trampoline run.
///
/// A tuning parameter, not a behavioral contract: delivery re-schedules
/// itself while envelopes remain, so every envelope is eventually delivered
/// in order. The bound keeps a burst of posts from starving the other
/// runnables sharing the owning thread, while letting a typical burst drain
/// in one pass.
pub const MAX_DELIVERY_BATCH: usize = 16;

/// Accumulates envelopes for a single logical owner and has them delivered,
/// in FIFO order and in bounded batches, on the owner's scheduler.
///
/// Producers hold at most a `Weak<Mailbox>`; the owning
/// [`Actor`](crate::actor::Actor) is the only strong owner and closes the
/// mailbox when destroyed, after which pushes are silently dropped. That
/// weak-resolve-or-no-op discipline — not reference counting of producers —
/// is what makes posting to a dying actor a benign race instead of a fault.
pub struct Mailbox {
    queue: Mutex<QueueState>,
    /// Serializes delivery so two schedulers never drain concurrently.
    receiving: Mutex<()>,
    /// True while a delivery trampoline is pending on the scheduler.
    scheduled: AtomicBool,
    scheduler: Arc<dyn Scheduler>,
    weak_self: Weak<Mailbox>,
}

struct QueueState {
    envelopes: VecDeque<Envelope>,
    closed: bool,
}

impl Mailbox {
    /// Creates a mailbox whose delivery runs on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            queue: Mutex::new(QueueState {
                envelopes: VecDeque::new(),
                closed: false,
            }),
            receiving: Mutex::new(()),
            scheduled: AtomicBool::new(false),
            scheduler,
            weak_self: weak.clone(),
        })
    }

    /// Enqueues an envelope. Thread-safe; schedules delivery when the queue
    /// transitions from empty to non-empty. Dropped silently if the mailbox
    /// has been closed.
    pub fn push(&self, envelope: Envelope) {
        let was_empty = {
            let mut queue = self.queue.lock().expect("mailbox queue poisoned");
            if queue.closed {
                trace!("push to closed mailbox dropped");
                return;
            }
            let was_empty = queue.envelopes.is_empty();
            queue.envelopes.push_back(envelope);
            was_empty
        };
        if was_empty {
            self.schedule();
        }
    }

    /// Ensures exactly one delivery trampoline is pending on the owner's
    /// scheduler (test-and-set, like a signal send).
    pub fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.schedule(self.weak_self.clone());
    }

    /// Closes the mailbox and discards queued envelopes. Further pushes are
    /// dropped. Called by the owning actor on destruction.
    pub fn close(&self) {
        let mut queue = self.queue.lock().expect("mailbox queue poisoned");
        queue.closed = true;
        queue.envelopes.clear();
    }

    /// Whether the mailbox has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.lock().expect("mailbox queue poisoned").closed
    }

    /// Number of envelopes currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().expect("mailbox queue poisoned").envelopes.len()
    }

    /// Whether no envelopes are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves `mailbox` and delivers a batch, or returns silently if the
    /// owner has been destroyed — the normal shutdown race, not a fault.
    pub fn maybe_receive(mailbox: &Weak<Self>) {
        if let Some(mailbox) = mailbox.upgrade() {
            mailbox.receive();
        }
    }

    fn receive(&self) {
        let _receiving = self.receiving.lock().expect("mailbox delivery poisoned");
        // Clear before draining so a push that lands mid-batch can re-arm.
        self.scheduled.store(false, Ordering::Release);

        let batch: Vec<Envelope> = {
            let mut queue = self.queue.lock().expect("mailbox queue poisoned");
            let take = queue.envelopes.len().min(MAX_DELIVERY_BATCH);
            queue.envelopes.drain(..take).collect()
        };
        for envelope in batch {
            envelope();
        }

        let more = {
            let queue = self.queue.lock().expect("mailbox queue poisoned");
            !queue.closed && !queue.envelopes.is_empty()
        };
        if more {
            self.schedule();
        }
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.lock().expect("mailbox queue poisoned");
        f.debug_struct("Mailbox")
            .field("queued", &queue.envelopes.len())
            .field("closed", &queue.closed)
            .field("scheduled", &self.scheduled.load(Ordering::Relaxed))
            .finish()
    }
}
