//! Error types for the scheduling core.
//!
//! Errors here follow a strict split:
//!
//! - **Construction/teardown** failures (attaching a run loop, spawning pool
//!   threads) are surfaced immediately at the call site and never deferred.
//! - **Dead-target** conditions (posting to a destroyed actor, scheduling
//!   against a dropped loop) are not errors at all; they are absorbed by the
//!   weak-reference checks on those paths.
//! - **Conversion** failures inside the update pipeline are reported once and
//!   skipped; they never wedge the pipeline.
//!
//! Steady-state scheduling operations (`send`, `start`, `push`, `post`,
//! `schedule`, `set_async`) are infallible by construction and return nothing.

use std::io;
use thiserror::Error;

/// Errors surfaced by fallible construction and teardown paths.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A run loop is already attached to the current thread.
    #[error("a run loop is already attached to this thread")]
    LoopAlreadyAttached,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {source}")]
    ThreadSpawn {
        /// The underlying OS error.
        #[from]
        source: io::Error,
    },

    /// A background conversion rejected its input.
    #[error("conversion failed: {message}")]
    ConversionFailed {
        /// Description of what the converter rejected.
        message: String,
    },
}

impl Error {
    /// Builds a [`Error::ConversionFailed`] from any displayable reason.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::ConversionFailed {
            message: message.into(),
        }
    }
}

/// Result alias used by the fallible constructors in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        let err = Error::conversion("unexpected token at byte 12");
        assert_eq!(
            err.to_string(),
            "conversion failed: unexpected token at byte 12"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io_err = io::Error::new(io::ErrorKind::WouldBlock, "out of threads");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::ThreadSpawn { .. }));
    }
}
