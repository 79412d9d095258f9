//! Deduplicating wake-me-once primitive.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::runloop::{LoopHandle, RunLoop, Runnable};
use crate::time::Deadline;

/// Collapses any number of `send` calls into a single execution of its
/// callback on the owning thread.
///
/// `send` is callable from any thread and is idempotent while a firing is
/// already pending: between two consecutive firings, at least one `send`
/// occurred, and any number of them produce exactly one firing. The pending
/// flag is cleared before the callback runs, so a `send` issued from inside
/// the callback schedules a fresh, separate firing.
pub struct Signal {
    shared: Arc<SignalShared>,
    queue: LoopHandle,
}

struct SignalShared {
    pending: AtomicBool,
    callback: Box<dyn Fn() + Send + Sync>,
}

impl Runnable for SignalShared {
    fn due_time(&self) -> Deadline {
        Deadline::Immediate
    }

    fn run_task(&self) {
        // Clear before invoking: a send() issued during the callback arms a
        // fresh firing instead of being swallowed.
        self.pending.store(false, Ordering::Release);
        (self.callback)();
    }
}

impl Signal {
    /// Binds a signal to the calling thread's run loop.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread has no attached run loop.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::bound(RunLoop::current(), callback)
    }

    /// Binds a signal to an explicit run loop.
    pub fn bound<F>(queue: LoopHandle, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(SignalShared {
                pending: AtomicBool::new(false),
                callback: Box::new(callback),
            }),
            queue,
        }
    }

    /// Requests one execution of the callback on the owning thread.
    ///
    /// No-op while an execution is already pending; callable from any
    /// thread; never blocks beyond the queue's short-lived insert lock.
    pub fn send(&self) {
        if self.shared.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.add_runnable(self.shared.clone());
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("pending", &self.shared.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        let task: Arc<dyn Runnable> = self.shared.clone();
        self.queue.remove_runnable(&task);
    }
}
