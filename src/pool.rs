//! Background worker pool for actor delivery.
//!
//! A fixed set of OS threads drains an injection queue of weak mailbox
//! references: each popped reference is resolved and delivered via
//! [`Mailbox::maybe_receive`]. Mailboxes serialize their own delivery, so
//! two workers never execute one actor's envelopes concurrently; the pool
//! only provides threads and parking.
//!
//! Workers park on a condition variable when the queue is empty and observe
//! the shutdown flag between deliveries; dropping the pool wakes and joins
//! them. Construction is the only fallible operation — a thread that cannot
//! be spawned surfaces as an error at the call site, never later.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;
use tracing::debug;

use crate::actor::{Mailbox, Scheduler};
use crate::error::Result;

/// Configuration for a [`ThreadPool`].
#[derive(Clone)]
pub struct PoolOptions {
    /// Number of worker threads.
    pub threads: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Callback invoked on each worker thread as it starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback invoked on each worker thread as it stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map_or(4, usize::from),
            thread_name_prefix: "renderloop".to_string(),
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("threads", &self.threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}

/// A fixed-size pool of background threads implementing [`Scheduler`].
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    queue: SegQueue<Weak<Mailbox>>,
    /// Mutex for the parking condvar; pairs notification with the
    /// queue-empty check so wakes are never missed.
    park: Mutex<()>,
    condvar: Condvar,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Creates a pool with `threads` workers and default options.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`](crate::Error::ThreadSpawn) if a worker thread
    /// cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero.
    pub fn new(threads: usize) -> Result<Arc<Self>> {
        Self::with_options(PoolOptions {
            threads,
            ..PoolOptions::default()
        })
    }

    /// Creates a pool from explicit options.
    ///
    /// # Errors
    ///
    /// [`Error::ThreadSpawn`](crate::Error::ThreadSpawn) if a worker thread
    /// cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `options.threads` is zero.
    pub fn with_options(options: PoolOptions) -> Result<Arc<Self>> {
        assert!(options.threads > 0, "pool must have at least one thread");

        let inner = Arc::new(PoolInner {
            queue: SegQueue::new(),
            park: Mutex::new(()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            handles: Mutex::new(Vec::with_capacity(options.threads)),
        });

        for index in 0..options.threads {
            let worker = Arc::clone(&inner);
            let on_start = options.on_thread_start.clone();
            let on_stop = options.on_thread_stop.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-worker-{index}", options.thread_name_prefix))
                .spawn(move || {
                    if let Some(callback) = on_start {
                        callback();
                    }
                    worker_loop(&worker);
                    if let Some(callback) = on_stop {
                        callback();
                    }
                })?;
            inner
                .handles
                .lock()
                .expect("pool handles poisoned")
                .push(handle);
        }

        debug!(threads = options.threads, "worker pool started");
        Ok(Arc::new(Self { inner }))
    }

    /// The process-wide shared background pool.
    ///
    /// Created on first use with default options, dropped when the last
    /// user releases it, recreated on the next call.
    ///
    /// # Panics
    ///
    /// Panics if the pool's worker threads cannot be spawned — a fatal
    /// setup condition.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Mutex<Weak<ThreadPool>>> = OnceLock::new();
        let slot = SHARED.get_or_init(|| Mutex::new(Weak::new()));
        let mut slot = slot.lock().expect("shared pool registry poisoned");
        if let Some(pool) = slot.upgrade() {
            return pool;
        }
        let pool =
            Self::with_options(PoolOptions::default()).expect("failed to start shared worker pool");
        *slot = Arc::downgrade(&pool);
        pool
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

impl Scheduler for ThreadPool {
    fn schedule(&self, mailbox: Weak<Mailbox>) {
        self.inner.queue.push(mailbox);
        let _park = self.inner.park.lock().expect("pool park poisoned");
        self.inner.condvar.notify_one();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("queued", &self.inner.queue.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _park = self.inner.park.lock().expect("pool park poisoned");
            self.inner.condvar.notify_all();
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut handles = self.inner.handles.lock().expect("pool handles poisoned");
            handles.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(inner: &Arc<PoolInner>) {
    loop {
        while let Some(mailbox) = inner.queue.pop() {
            Mailbox::maybe_receive(&mailbox);
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        let park = inner.park.lock().expect("pool park poisoned");
        // Re-check under the parking lock: a schedule() between our empty
        // pop and this point has already taken the lock or is blocked on it.
        if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
            drop(
                inner
                    .condvar
                    .wait(park)
                    .expect("pool park poisoned"),
            );
        }
    }
}
