//! The thread-affine task queue and its run loop.
//!
//! A [`RunLoop`] owns an ordered collection of pending [`Runnable`]s with
//! due-times, plus a wake primitive that lets the owning thread block
//! efficiently until new work arrives or a timer comes due. Producers on any
//! thread reach the loop through a [`LoopHandle`]; every handle operation
//! against a loop that has since been destroyed is a silent no-op.
//!
//! One loop per owning thread: construction registers the loop in a
//! thread-local slot (cleared again on drop) so that primitives built on top
//! of the queue — [`Signal`], [`Timer`], mailbox delivery — can bind to "the
//! current thread's loop" without ambient globals.
//!
//! # Processing model
//!
//! Each pass over the pending set snapshots the registered runnables, then
//! for every entry that is due re-checks its registration (removing it)
//! before invoking `run_task` outside the lock. Consequences:
//!
//! - a runnable removed by an earlier callback in the same pass does not run;
//! - a runnable that re-adds itself (a repeating timer, a signal re-sent from
//!   its own callback) runs again on a later pass, never twice in one pass;
//! - `due_time` and `run_task` are never called with the pending-set lock
//!   held, so runnables may keep their own internal locks without ordering
//!   concerns against the queue.

mod runnable;
mod signal;
mod timer;
mod wake;

pub use runnable::Runnable;
pub use signal::Signal;
pub use timer::Timer;

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tracing::trace;

use crate::error::{Error, Result};
use crate::time::Deadline;
use runnable::same_runnable;
use wake::WakeHandle;

thread_local! {
    static CURRENT_LOOP: RefCell<Option<Weak<LoopInner>>> = const { RefCell::new(None) };
}

pub(crate) struct LoopInner {
    pending: Mutex<Vec<Arc<dyn Runnable>>>,
    wake: WakeHandle,
    stopped: AtomicBool,
}

impl LoopInner {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            wake: WakeHandle::new(),
            stopped: AtomicBool::new(false),
        }
    }

    fn insert(&self, task: Arc<dyn Runnable>) {
        let mut pending = self.pending.lock().expect("pending set poisoned");
        if !pending.iter().any(|p| same_runnable(p, &task)) {
            pending.push(task);
        }
    }

    fn remove(&self, task: &Arc<dyn Runnable>) {
        let mut pending = self.pending.lock().expect("pending set poisoned");
        pending.retain(|p| !same_runnable(p, task));
    }

    /// Removes `task` if still registered, reporting whether it was.
    fn take_if_registered(&self, task: &Arc<dyn Runnable>) -> bool {
        let mut pending = self.pending.lock().expect("pending set poisoned");
        if let Some(index) = pending.iter().position(|p| same_runnable(p, task)) {
            pending.swap_remove(index);
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Runnable>> {
        self.pending.lock().expect("pending set poisoned").clone()
    }

    fn process_due(&self, now: Instant) -> Deadline {
        for task in self.snapshot() {
            if !task.due_time().is_due(now) {
                continue;
            }
            // An entry deregistered since the snapshot (by a callback earlier
            // in this pass, or by a concurrent stop) must not fire.
            if self.take_if_registered(&task) {
                task.run_task();
            }
        }
        self.snapshot()
            .iter()
            .map(|task| task.due_time())
            .min()
            .unwrap_or(Deadline::Never)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.wake();
    }
}

/// The task queue owned by a single thread.
///
/// Constructed on the thread that will drain it; handles obtained via
/// [`RunLoop::handle`] (or [`RunLoop::current`] from code already on the
/// owning thread) may be cloned and used from anywhere.
pub struct RunLoop {
    inner: Arc<LoopInner>,
    // Thread-affine: the loop is driven only by its owning thread.
    _not_send: PhantomData<*const ()>,
}

impl RunLoop {
    /// Creates a run loop owned by the calling thread and registers it as
    /// that thread's current loop.
    ///
    /// # Errors
    ///
    /// [`Error::LoopAlreadyAttached`] if this thread already owns a live
    /// run loop.
    pub fn new() -> Result<Self> {
        CURRENT_LOOP.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref().is_some_and(|weak| weak.strong_count() > 0) {
                return Err(Error::LoopAlreadyAttached);
            }
            let inner = Arc::new(LoopInner::new());
            *slot = Some(Arc::downgrade(&inner));
            trace!("run loop attached to thread");
            Ok(Self {
                inner,
                _not_send: PhantomData,
            })
        })
    }

    /// Handle to the calling thread's run loop, if one is attached.
    #[must_use]
    pub fn try_current() -> Option<LoopHandle> {
        CURRENT_LOOP.with(|slot| {
            let slot = slot.borrow();
            let weak = slot.as_ref()?;
            weak.upgrade().map(|_| LoopHandle {
                inner: weak.clone(),
            })
        })
    }

    /// Handle to the calling thread's run loop.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread has not attached a run loop; binding
    /// work to a thread without a loop is a programming error surfaced at
    /// the call site.
    #[must_use]
    pub fn current() -> LoopHandle {
        Self::try_current().expect("no run loop is attached to the current thread")
    }

    /// A clonable, weakly-owning handle usable from any thread.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Runs every pending runnable that is due at `now` and returns the
    /// earliest deadline among those that remain ([`Deadline::Never`] when
    /// the set is empty).
    ///
    /// Exposed for callers that drive the loop with their own clock; `run`
    /// and `run_once` call this with `Instant::now()`.
    pub fn process_due(&self, now: Instant) -> Deadline {
        self.inner.process_due(now)
    }

    /// A single non-blocking processing pass at the current time.
    pub fn run_once(&self) {
        self.inner.process_due(Instant::now());
    }

    /// Drains due runnables, then blocks on the wake primitive until new
    /// work arrives or the next deadline passes; repeats until [`stop`] is
    /// observed between iterations.
    ///
    /// [`stop`]: RunLoop::stop
    pub fn run(&self) {
        self.inner.stopped.store(false, Ordering::Release);
        loop {
            let next = self.inner.process_due(Instant::now());
            if self.inner.stopped.load(Ordering::Acquire) {
                break;
            }
            self.inner.wake.wait(next);
            if self.inner.stopped.load(Ordering::Acquire) {
                break;
            }
        }
    }

    /// Flags the loop to exit `run` and wakes it. Not a hard interrupt: a
    /// runnable already executing completes first.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .inner
            .pending
            .lock()
            .map(|p| p.len())
            .unwrap_or_default();
        f.debug_struct("RunLoop").field("pending", &pending).finish()
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.inner.stop();
        self.inner
            .pending
            .lock()
            .expect("pending set poisoned")
            .clear();
        CURRENT_LOOP.with(|slot| {
            let mut slot = slot.borrow_mut();
            let is_me = slot
                .as_ref()
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&self.inner)));
            if is_me {
                *slot = None;
            }
        });
        trace!("run loop detached from thread");
    }
}

/// A clonable, weakly-owning reference to a [`RunLoop`].
///
/// Every operation on a handle whose loop has been destroyed is a silent
/// no-op; producers racing an owning thread's shutdown never fault.
#[derive(Clone)]
pub struct LoopHandle {
    inner: Weak<LoopInner>,
}

impl LoopHandle {
    /// Registers `task` if absent (idempotent) and wakes the loop.
    /// Callable from any thread.
    pub fn add_runnable(&self, task: Arc<dyn Runnable>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.insert(task);
            // Wake outside the pending-set lock.
            inner.wake.wake();
        } else {
            trace!("runnable registered against a destroyed run loop; dropped");
        }
    }

    /// Deregisters `task` if present (idempotent). Callable from any thread.
    pub fn remove_runnable(&self, task: &Arc<dyn Runnable>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(task);
        }
    }

    /// Enqueues a closure to run once on the owning thread.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_runnable(Arc::new(PostedTask::new(task)));
    }

    /// Wakes the owning thread without scheduling anything.
    pub fn wake(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.wake.wake();
        }
    }

    /// Flags the loop to exit `run` and wakes it.
    pub fn stop(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.stop();
        }
    }

    /// Whether the loop behind this handle still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// One-shot trampoline behind [`LoopHandle::post`].
struct PostedTask {
    task: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl PostedTask {
    fn new<F>(task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            task: Mutex::new(Some(Box::new(task))),
        }
    }
}

impl Runnable for PostedTask {
    fn due_time(&self) -> Deadline {
        Deadline::Immediate
    }

    fn run_task(&self) {
        let task = self.task.lock().expect("posted task poisoned").take();
        if let Some(task) = task {
            task();
        }
    }
}
