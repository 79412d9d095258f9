//! Latest-wins pipeline for expensive background conversions.
//!
//! A caller on the owning thread hands over raw data at arbitrary
//! frequency; each request is a converter closure producing an immutable
//! snapshot. Conversion runs on a background actor, and the result is
//! applied back on the owning thread. The pipeline holds exactly two slots:
//! one conversion *in flight* and at most one *awaiting*. A new request
//! always overwrites the awaiting slot — superseded converters are dropped
//! without ever running — so the applied state converges to the most recent
//! request no matter how fast requests arrive.
//!
//! This is the asynchronous analogue of
//! [`Signal`](crate::runloop::Signal)'s deduplication, generalized to carry
//! a payload.
//!
//! A converter that fails is logged once and applies nothing; the pipeline
//! keeps serving subsequent requests.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use crate::actor::{Actor, ActorRef, Mailbox, Scheduler};
use crate::error::Error;

/// A one-shot conversion of externally-supplied data into an immutable
/// snapshot.
pub type Converter<T> = Box<dyn FnOnce() -> Result<T, Error> + Send>;

/// Accepts rapid update requests, converts them on a background scheduler,
/// and applies only the most recent result on the owning thread.
pub struct CoalescingPipeline<T: Send + 'static> {
    shared: Arc<PipelineShared<T>>,
    /// Completion deliveries ride this mailbox back to the owning thread.
    reply_mailbox: Arc<Mailbox>,
    /// The background converter actor; owning it here bounds its lifetime
    /// to the pipeline's.
    _worker: Actor<ConvertWorker>,
}

struct PipelineShared<T: Send + 'static> {
    slot: Mutex<Slot<T>>,
    apply: Box<dyn Fn(T) + Send + Sync>,
    worker: ActorRef<ConvertWorker>,
    reply: Weak<Mailbox>,
}

/// The two-deep request buffer: one conversion running, one superseding it.
struct Slot<T> {
    in_flight: bool,
    awaiting: Option<Converter<T>>,
}

/// State of the background conversion actor. Conversions close over
/// everything they need; the actor only provides the thread and ordering.
struct ConvertWorker;

impl<T: Send + 'static> CoalescingPipeline<T> {
    /// Creates a pipeline whose completions run on `owner` and whose
    /// conversions run on `workers`; `apply` receives each surviving
    /// snapshot on the owning thread.
    #[must_use]
    pub fn new<F>(owner: Arc<dyn Scheduler>, workers: Arc<dyn Scheduler>, apply: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let worker = Actor::new(workers, ConvertWorker);
        let reply_mailbox = Mailbox::new(owner);
        let shared = Arc::new(PipelineShared {
            slot: Mutex::new(Slot {
                in_flight: false,
                awaiting: None,
            }),
            apply: Box::new(apply),
            worker: worker.actor_ref(),
            reply: Arc::downgrade(&reply_mailbox),
        });
        Self {
            shared,
            reply_mailbox,
            _worker: worker,
        }
    }

    /// Requests an update. Always replaces any not-yet-started request; if
    /// no conversion is in flight, this one starts immediately.
    ///
    /// Never blocks and never fails: a conversion error is logged when the
    /// converter completes, and that request simply applies nothing.
    pub fn set_async<F>(&self, convert: F)
    where
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        let started = {
            let mut slot = self.shared.slot.lock().expect("update slot poisoned");
            slot.awaiting = Some(Box::new(convert));
            if slot.in_flight {
                // The running conversion promotes the awaiting slot when it
                // completes.
                None
            } else {
                slot.in_flight = true;
                slot.awaiting.take()
            }
        };
        if let Some(converter) = started {
            PipelineShared::start(&self.shared, converter);
        }
    }

    /// Whether no conversion is running and none is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let slot = self.shared.slot.lock().expect("update slot poisoned");
        !slot.in_flight && slot.awaiting.is_none()
    }
}

impl<T: Send + 'static> fmt::Debug for CoalescingPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.shared.slot.lock().expect("update slot poisoned");
        f.debug_struct("CoalescingPipeline")
            .field("in_flight", &slot.in_flight)
            .field("awaiting", &slot.awaiting.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Drop for CoalescingPipeline<T> {
    fn drop(&mut self) {
        // A conversion still in flight delivers into a closed mailbox and
        // is discarded; its result is never applied.
        self.reply_mailbox.close();
    }
}

impl<T: Send + 'static> PipelineShared<T> {
    /// Posts `converter` to the background actor. The completion path posts
    /// back through the reply mailbox; both links are weak, so a pipeline
    /// destroyed mid-conversion drops the completion on the floor.
    fn start(this: &Arc<Self>, converter: Converter<T>) {
        let shared = Arc::downgrade(this);
        let reply = this.reply.clone();
        this.worker.post(move |_| {
            let result = converter();
            if let Some(reply) = reply.upgrade() {
                let shared = shared.clone();
                reply.push(Box::new(move || {
                    if let Some(shared) = shared.upgrade() {
                        Self::complete(&shared, result);
                    }
                }));
            }
        });
    }

    /// Runs on the owning thread: applies the finished conversion, then
    /// promotes the awaiting request or goes idle.
    fn complete(this: &Arc<Self>, result: Result<T, Error>) {
        match result {
            // Applied outside the slot lock: apply may call set_async.
            Ok(snapshot) => (this.apply)(snapshot),
            Err(error) => warn!(%error, "update conversion failed; keeping previous state"),
        }
        let next = {
            let mut slot = this.slot.lock().expect("update slot poisoned");
            match slot.awaiting.take() {
                Some(converter) => Some(converter),
                None => {
                    slot.in_flight = false;
                    None
                }
            }
        };
        if let Some(converter) = next {
            Self::start(this, converter);
        }
    }
}
