//! Failure taxonomy shared by every computation.
//!
//! Errors are cheap to clone so that each subscriber of a failed computation
//! observes the same value.

use std::{error::Error as StdError, rc::Rc};

/// Why a computation did not produce a result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An awaited computation was cancelled before it completed.
    #[error("awaited computation was interrupted before it completed")]
    Interrupted,
    /// An application failure raised inside a coroutine.
    #[error("{0}")]
    Failed(Rc<dyn StdError + 'static>),
    /// A cleanup section failed while a computation was being torn down.
    #[error("cleanup failed: {0}")]
    Cleanup(#[source] Box<Error>),
    /// The task queue ran out of work before the driven computation settled.
    #[error("computation {0} was still pending when the task queue went idle")]
    Stalled(crate::computation::ComputationId),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    /// Wrap an application error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Error::Failed(Rc::new(error))
    }

    /// Build an application error from a plain message.
    ///
    /// ```rust
    /// use strand::Error;
    ///
    /// let e = Error::msg("boom");
    /// assert_eq!(e.to_string(), "boom");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Error::new(Message(message.into()))
    }

    pub(crate) fn cleanup(error: Error) -> Self {
        match error {
            Error::Cleanup(_) => error,
            other => Error::Cleanup(Box::new(other)),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    pub fn is_cleanup(&self) -> bool {
        matches!(self, Error::Cleanup(_))
    }

    /// Look through the wrapper for a concrete application error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Error::Failed(inner) => inner.downcast_ref::<E>(),
            Error::Cleanup(inner) => inner.downcast_ref::<E>(),
            Error::Interrupted | Error::Stalled(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_downcast_recovers_application_error() {
        let e = Error::new(DiskFull);
        assert!(e.downcast_ref::<DiskFull>().is_some());
        assert_eq!(e.to_string(), "disk full");
    }

    #[test]
    fn test_cleanup_wraps_once() {
        let e = Error::cleanup(Error::cleanup(Error::new(DiskFull)));
        assert!(e.is_cleanup());
        assert_eq!(e.to_string(), "cleanup failed: disk full");
        assert!(e.downcast_ref::<DiskFull>().is_some());
    }

    #[test]
    fn test_interrupted_is_distinct_from_failure() {
        assert!(Error::Interrupted.is_interrupted());
        assert!(!Error::msg("crash").is_interrupted());
    }
}
