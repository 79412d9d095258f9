//! Renderloop: the cross-thread scheduling core of a single-threaded
//! rendering engine.
//!
//! A rendering thread cannot block, a host UI thread must not be re-entered
//! from the wrong thread, and background workers must hand off immutable
//! results safely. This crate is the machinery that makes those guarantees
//! hold: asynchronous work produced on any thread is executed, in order and
//! exactly once, on the thread that owns it.
//!
//! # Core Guarantees
//!
//! - **No blocked producers**: every entry point (`send`, `start`, `push`,
//!   `post`, `set_async`) takes a short-lived lock and returns; work always
//!   executes later on the owning thread.
//! - **No double execution**: a runnable is a member of at most one pending
//!   set at most once; signal sends and update requests coalesce instead of
//!   stacking.
//! - **No faults at shutdown**: every cross-thread link is weak; posting to
//!   a destroyed loop, actor, or bridge is a silent no-op.
//! - **Convergence**: rapid repeated updates converge to the most recent
//!   request; superseded conversions never run.
//!
//! # Module Structure
//!
//! - [`runloop`]: the thread-affine task queue, its run loop, and the
//!   [`Signal`]/[`Timer`] primitives built on it
//! - [`actor`]: mailboxes, actors, weak actor references, the scheduler
//!   seam, and the host-runtime bridge
//! - [`pool`]: the background worker pool
//! - [`update`]: the coalescing update pipeline
//! - [`time`]: overflow-proof due-time arithmetic
//! - [`error`]: error types
//! - [`test_utils`]: logging and polling helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::new_without_default)]

pub mod actor;
pub mod error;
pub mod pool;
pub mod runloop;
pub mod test_utils;
pub mod time;
pub mod update;

pub use actor::{
    Actor, ActorRef, Envelope, HostBridge, HostCallback, HostRuntime, Mailbox, Scheduler,
    MAX_DELIVERY_BATCH,
};
pub use error::{Error, Result};
pub use pool::{PoolOptions, ThreadPool};
pub use runloop::{LoopHandle, RunLoop, Runnable, Signal, Timer};
pub use time::Deadline;
pub use update::{CoalescingPipeline, Converter};
