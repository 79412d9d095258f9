//! Due-time arithmetic for scheduled work.
//!
//! Every schedulable unit of work carries a [`Deadline`]. Representing the
//! due-time as a three-state enum instead of a raw [`Instant`] gives two
//! things for free: "already due" needs no clock read, and a timeout of
//! [`Duration::MAX`] becomes [`Deadline::Never`] instead of wrapping past the
//! end of the representable time range.
//!
//! Deadlines order as `Immediate < At(earlier) < At(later) < Never`, so the
//! minimum over a pending set is exactly the next wait bound for the loop.

use std::time::{Duration, Instant};

/// The point in time at which a runnable becomes eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Deadline {
    /// Due on the next processing pass, regardless of the clock.
    Immediate,
    /// Due once the clock reaches the contained instant.
    At(Instant),
    /// Never due. Produced by timeouts too large to represent and used as
    /// the "wait forever" bound when nothing is pending.
    Never,
}

impl Deadline {
    /// Deadline `timeout` from now. Saturates to [`Deadline::Never`] when the
    /// addition would overflow the clock's representable range.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self::from_now(Instant::now(), timeout)
    }

    /// Deadline `timeout` past an explicit `now`.
    #[must_use]
    pub fn from_now(now: Instant, timeout: Duration) -> Self {
        now.checked_add(timeout).map_or(Self::Never, Self::At)
    }

    /// Whether the deadline has been reached at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        match self {
            Self::Immediate => true,
            Self::At(at) => *at <= now,
            Self::Never => false,
        }
    }
}
