//! One-shot and repeating timer.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::runloop::{LoopHandle, RunLoop, Runnable};
use crate::time::Deadline;

/// Schedules a callback after a timeout, optionally repeating.
///
/// `start` replaces any previous schedule (stop-then-arm: pending fires
/// never stack), and `stop` cancels it. When repeating, the timer re-arms
/// *before* invoking the callback, so a callback that calls `stop` cancels
/// the just-re-armed schedule. A timeout of [`Duration::MAX`] arms a
/// deadline that never comes due instead of overflowing the clock.
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    state: Mutex<Option<TimerState>>,
    queue: LoopHandle,
    weak_self: Weak<TimerInner>,
}

struct TimerState {
    deadline: Deadline,
    repeat: Option<Duration>,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Runnable for TimerInner {
    fn due_time(&self) -> Deadline {
        self.state
            .lock()
            .expect("timer state poisoned")
            .as_ref()
            .map_or(Deadline::Never, |state| state.deadline)
    }

    fn run_task(&self) {
        let callback = {
            let mut slot = self.state.lock().expect("timer state poisoned");
            let Some(state) = slot.as_mut() else {
                // Stopped between the queue's due scan and this call.
                return;
            };
            let now = Instant::now();
            if !state.deadline.is_due(now) {
                // Restarted with a later deadline in the same window; the
                // queue entry was consumed, so put it back.
                self.re_register();
                return;
            }
            let callback = Arc::clone(&state.callback);
            match state.repeat {
                Some(interval) => {
                    // Re-arm before invoking so a stop() from inside the
                    // callback cancels this schedule.
                    state.deadline = Deadline::from_now(now, interval);
                    self.re_register();
                }
                None => {
                    *slot = None;
                }
            }
            callback
        };
        callback();
    }
}

impl TimerInner {
    fn re_register(&self) {
        if let Some(me) = self.weak_self.upgrade() {
            self.queue.add_runnable(me);
        }
    }
}

impl Timer {
    /// Creates an unarmed timer bound to the calling thread's run loop.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread has no attached run loop.
    #[must_use]
    pub fn new() -> Self {
        Self::bound(RunLoop::current())
    }

    /// Creates an unarmed timer bound to an explicit run loop.
    #[must_use]
    pub fn bound(queue: LoopHandle) -> Self {
        Self {
            inner: Arc::new_cyclic(|weak| TimerInner {
                state: Mutex::new(None),
                queue,
                weak_self: weak.clone(),
            }),
        }
    }

    /// Arms the timer: `callback` fires once `timeout` elapses, then every
    /// `repeat` if given. Any previous schedule is cancelled first.
    ///
    /// Callable from any thread.
    pub fn start<F>(&self, timeout: Duration, repeat: Option<Duration>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop();
        {
            let mut slot = self.inner.state.lock().expect("timer state poisoned");
            *slot = Some(TimerState {
                deadline: Deadline::after(timeout),
                repeat,
                callback: Arc::new(callback),
            });
        }
        self.inner.queue.add_runnable(self.inner.clone());
    }

    /// Cancels any pending schedule. Idempotent; callable from any thread.
    pub fn stop(&self) {
        {
            let mut slot = self.inner.state.lock().expect("timer state poisoned");
            *slot = None;
        }
        let task: Arc<dyn Runnable> = self.inner.clone();
        self.inner.queue.remove_runnable(&task);
    }

    /// Whether a schedule is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("timer state poisoned")
            .is_some()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_once_after_timeout() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let fired = Arc::new(AtomicUsize::new(0));

        let timer = Timer::bound(rl.handle());
        let counter = Arc::clone(&fired);
        timer.start(Duration::from_millis(10), None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let now = Instant::now();
        rl.process_due(now);
        assert_eq!(fired.load(Ordering::SeqCst), 0, "fired before due");

        rl.process_due(now + Duration::from_millis(15));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        rl.process_due(now + Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1, "one-shot fired twice");
    }

    #[test]
    fn restart_replaces_the_previous_schedule() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let timer = Timer::bound(rl.handle());
        let counter = Arc::clone(&first);
        timer.start(Duration::from_millis(10), None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        timer.start(Duration::from_millis(20), None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        rl.process_due(Instant::now() + Duration::from_millis(60));
        assert_eq!(first.load(Ordering::SeqCst), 0, "replaced schedule fired");
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeating_fires_every_interval() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let fired = Arc::new(AtomicUsize::new(0));

        let timer = Timer::bound(rl.handle());
        let counter = Arc::clone(&fired);
        timer.start(
            Duration::from_millis(10),
            Some(Duration::from_millis(10)),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let start = Instant::now();
        for step in 1..=10 {
            rl.process_due(start + Duration::from_millis(10 * step));
        }

        let count = fired.load(Ordering::SeqCst);
        assert!(
            (9..=10).contains(&count),
            "expected 9 or 10 fires over the window, got {count}"
        );
        assert!(timer.is_armed());
    }

    #[test]
    fn stop_from_inside_the_callback_cancels_the_rearm() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let fired = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<Timer>>>> = Arc::new(Mutex::new(None));

        let timer = Arc::new(Timer::bound(rl.handle()));
        let counter = Arc::clone(&fired);
        let inner_slot = Arc::clone(&slot);
        timer.start(
            Duration::from_millis(10),
            Some(Duration::from_millis(10)),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = inner_slot.lock().expect("slot poisoned").as_ref() {
                    me.stop();
                }
            },
        );
        *slot.lock().expect("slot poisoned") = Some(Arc::clone(&timer));

        let start = Instant::now();
        for step in 1..=5 {
            rl.process_due(start + Duration::from_millis(10 * step));
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
        slot.lock().expect("slot poisoned").take();
    }

    #[test]
    fn max_timeout_never_fires() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let fired = Arc::new(AtomicUsize::new(0));

        let timer = Timer::bound(rl.handle());
        let counter = Arc::clone(&fired);
        timer.start(Duration::MAX, None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let start = Instant::now();
        rl.process_due(start);
        rl.process_due(start + Duration::from_secs(86_400));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_armed(), "a never-due schedule stays armed");
        assert_eq!(rl.process_due(start), Deadline::Never);
    }

    #[test]
    fn stop_before_due_cancels() {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let fired = Arc::new(AtomicUsize::new(0));

        let timer = Timer::bound(rl.handle());
        let counter = Arc::clone(&fired);
        timer.start(Duration::from_millis(10), None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.stop();

        rl.process_due(Instant::now() + Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
