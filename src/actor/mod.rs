//! Mailbox-backed actors.
//!
//! An [`Actor`] pairs a piece of state with a [`Mailbox`] delivered on a
//! chosen [`Scheduler`]. Other threads interact with it exclusively through
//! clonable [`ActorRef`]s, which hold only weak links: a post racing the
//! actor's destruction is silently dropped, never a fault. Envelopes execute
//! sequentially on the owning thread, so the actor's state needs no
//! synchronization of its own beyond the mailbox discipline.

mod bridge;
mod mailbox;
mod scheduler;

pub use bridge::{HostBridge, HostCallback, HostRuntime};
pub use mailbox::{Envelope, Mailbox, MAX_DELIVERY_BATCH};
pub use scheduler::Scheduler;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

/// Exclusive owner of an actor's state and mailbox.
///
/// Dropping the actor closes the mailbox first, so envelopes queued or
/// posted afterwards are discarded and the state is released immediately
/// (references hold only weak links).
pub struct Actor<A: Send + 'static> {
    object: Arc<Mutex<A>>,
    mailbox: Arc<Mailbox>,
}

impl<A: Send + 'static> Actor<A> {
    /// Creates an actor whose envelopes run on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, object: A) -> Self {
        Self {
            object: Arc::new(Mutex::new(object)),
            mailbox: Mailbox::new(scheduler),
        }
    }

    /// A clonable, weakly-owning reference for posting from any thread.
    #[must_use]
    pub fn actor_ref(&self) -> ActorRef<A> {
        ActorRef {
            object: Arc::downgrade(&self.object),
            mailbox: Arc::downgrade(&self.mailbox),
        }
    }

    /// Synchronous access to the state, for callers on the owning thread.
    ///
    /// Holding the owning `Actor` proves the caller controls the actor's
    /// lifetime; cross-thread callers must go through [`ActorRef::post`]
    /// instead so the work is serialized with envelope delivery.
    pub fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        let mut object = self.object.lock().expect("actor state poisoned");
        f(&mut object)
    }

    /// The actor's mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }
}

impl<A: Send + 'static> fmt::Debug for Actor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

impl<A: Send + 'static> Drop for Actor<A> {
    fn drop(&mut self) {
        // Close before the state is released: late posts resolve the weak
        // mailbox but find it closed, and queued envelopes are discarded.
        self.mailbox.close();
    }
}

/// A clonable, weakly-owning handle for posting work into an actor's
/// mailbox from any thread.
pub struct ActorRef<A: Send + 'static> {
    object: Weak<Mutex<A>>,
    mailbox: Weak<Mailbox>,
}

impl<A: Send + 'static> ActorRef<A> {
    /// Posts a closure to run against the actor's state on its owning
    /// thread. Silently dropped if the actor has been destroyed; callers
    /// needing a reply must treat "no reply" as the normal shutdown race.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce(&mut A) + Send + 'static,
    {
        let Some(mailbox) = self.mailbox.upgrade() else {
            trace!("post to destroyed actor dropped");
            return;
        };
        let object = self.object.clone();
        mailbox.push(Box::new(move || {
            if let Some(object) = object.upgrade() {
                let mut object = object.lock().expect("actor state poisoned");
                f(&mut object);
            }
        }));
    }

    /// Whether the target actor still accepts posts.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.mailbox
            .upgrade()
            .is_some_and(|mailbox| !mailbox.is_closed())
    }
}

impl<A: Send + 'static> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<A: Send + 'static> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("connected", &self.is_connected())
            .finish()
    }
}
