//! The unit of schedulable work.

use std::sync::Arc;

use crate::time::Deadline;

/// A unit of work registered with a run loop.
///
/// A runnable is identified by the pointer identity of its `Arc<dyn
/// Runnable>` allocation; a given runnable is a member of at most one run
/// loop's pending set, at most once, at any time. `run_task` is only ever
/// invoked on the loop's owning thread, with no loop-internal lock held, so
/// it may freely add or remove runnables (including itself).
pub trait Runnable: Send + Sync {
    /// The point in time at which this runnable becomes eligible to run.
    fn due_time(&self) -> Deadline;

    /// Performs the unit of work.
    fn run_task(&self);
}

/// Pointer-identity comparison for pending-set membership.
pub(crate) fn same_runnable(a: &Arc<dyn Runnable>, b: &Arc<dyn Runnable>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Runnable for Noop {
        fn due_time(&self) -> Deadline {
            Deadline::Immediate
        }

        fn run_task(&self) {}
    }

    #[test]
    fn identity_is_per_allocation() {
        let a: Arc<dyn Runnable> = Arc::new(Noop);
        let b: Arc<dyn Runnable> = Arc::new(Noop);
        let a2 = Arc::clone(&a);

        assert!(same_runnable(&a, &a2));
        assert!(!same_runnable(&a, &b));
    }
}
