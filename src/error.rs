//! Unified error type for the resilience middleware layer.

use crate::time::TimeSpan;
use thiserror::Error;

/// Cap the number of stored failures inside RetryExhausted to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Error surfaced by a middleware pipeline around an operation failing with `E`.
///
/// Domain outcomes (contention, misses) are expressed by the wrapped
/// operation's own return value; this enum only carries middleware verdicts
/// and the operation's terminal errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResilienceError<E> {
    /// The operation exceeded the configured timeout.
    #[error("operation timed out after {elapsed} (limit: {timeout})")]
    Timeout { elapsed: TimeSpan, timeout: TimeSpan },
    /// The ambient cancel token fired.
    #[error("operation aborted: {reason}")]
    Aborted { reason: String },
    /// The concurrency limiter rejected the call.
    #[error("concurrency limit rejected call ({in_flight} in-flight, max {max})")]
    CapacityFull { in_flight: usize, max: usize },
    /// Every hedged attempt failed.
    #[error("all {} hedged attempts failed", errors.len())]
    Hedging { errors: Vec<ResilienceError<E>> },
    /// All retry attempts were exhausted.
    #[error("retry exhausted after {attempts} attempts ({} failures recorded)", failures.len())]
    RetryExhausted { attempts: u32, failures: Vec<E> },
    /// The underlying operation failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> ResilienceError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_capacity_full(&self) -> bool {
        matches!(self, Self::CapacityFull { .. })
    }

    pub fn is_hedging(&self) -> bool {
        matches!(self, Self::Hedging { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Consume, yielding the inner error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Recorded failures for `RetryExhausted`, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("dummy: {0}")]
    struct DummyError(&'static str);

    #[test]
    fn display_mentions_the_interesting_numbers() {
        let err: ResilienceError<DummyError> = ResilienceError::Timeout {
            elapsed: TimeSpan::from_millis(5_100),
            timeout: TimeSpan::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5100ms"));

        let err: ResilienceError<DummyError> =
            ResilienceError::CapacityFull { in_flight: 50, max: 50 };
        assert!(err.to_string().contains("50"));

        let err: ResilienceError<DummyError> = ResilienceError::RetryExhausted {
            attempts: 3,
            failures: vec![DummyError("a"), DummyError("b")],
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn predicates_cover_all_variants() {
        let timeout: ResilienceError<DummyError> =
            ResilienceError::Timeout { elapsed: TimeSpan::ZERO, timeout: TimeSpan::ZERO };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_inner());

        let aborted: ResilienceError<DummyError> =
            ResilienceError::Aborted { reason: "shutdown".into() };
        assert!(aborted.is_aborted());

        let full: ResilienceError<DummyError> =
            ResilienceError::CapacityFull { in_flight: 1, max: 1 };
        assert!(full.is_capacity_full());

        let hedging: ResilienceError<DummyError> = ResilienceError::Hedging { errors: vec![] };
        assert!(hedging.is_hedging());

        let retry: ResilienceError<DummyError> =
            ResilienceError::RetryExhausted { attempts: 2, failures: vec![] };
        assert!(retry.is_retry_exhausted());
    }

    #[test]
    fn inner_accessors_work() {
        let err = ResilienceError::Inner(DummyError("x"));
        assert_eq!(err.as_inner(), Some(&DummyError("x")));
        assert_eq!(err.into_inner(), Some(DummyError("x")));

        let err: ResilienceError<DummyError> =
            ResilienceError::Aborted { reason: "n/a".into() };
        assert_eq!(err.into_inner(), None);
    }

    #[test]
    fn failures_are_exposed_for_retry_exhausted() {
        let err: ResilienceError<DummyError> = ResilienceError::RetryExhausted {
            attempts: 2,
            failures: vec![DummyError("first"), DummyError("last")],
        };
        assert_eq!(err.failures().unwrap().len(), 2);
    }
}
