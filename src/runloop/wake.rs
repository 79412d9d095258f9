//! The loop's wake primitive.
//!
//! A sticky flag guarded by a mutex and condition variable. `wake` may be
//! called from any thread, including while the owning thread is processing
//! runnables rather than waiting; the flag makes that wake observable by the
//! next `wait` instead of being lost.

use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::time::Deadline;

pub(crate) struct WakeHandle {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl WakeHandle {
    pub(crate) fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Wakes the owning thread. Callable from any thread; never blocks
    /// beyond the flag mutex.
    pub(crate) fn wake(&self) {
        let mut woken = self.woken.lock().expect("wake flag poisoned");
        *woken = true;
        self.condvar.notify_one();
    }

    /// Blocks until woken or until `deadline` is reached. A wake issued
    /// since the previous `wait` returns immediately and consumes the flag.
    pub(crate) fn wait(&self, deadline: Deadline) {
        let mut woken = self.woken.lock().expect("wake flag poisoned");
        loop {
            if *woken {
                *woken = false;
                return;
            }
            match deadline {
                Deadline::Immediate => return,
                Deadline::Never => {
                    woken = self.condvar.wait(woken).expect("wake flag poisoned");
                }
                Deadline::At(at) => {
                    let now = Instant::now();
                    if at <= now {
                        return;
                    }
                    let (guard, _) = self
                        .condvar
                        .wait_timeout(woken, at - now)
                        .expect("wake flag poisoned");
                    woken = guard;
                }
            }
        }
    }
}
