//! Error types for TideSync.

use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classification of a failed operation, used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection reset, timeout, truncated transfer. Retryable with backoff.
    TransientNetwork,
    /// Source asked us to slow down. Retryable, honoring any hint.
    RateLimited,
    /// Source-side 5xx-style failure. Retryable with backoff.
    ServerError,
    /// Anything else. Not retryable; aborts the job.
    Fatal,
}

impl FailureClass {
    /// Returns true if operations failing with this class may be retried.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureClass::TransientNetwork => "transient-network",
            FailureClass::RateLimited => "rate-limited",
            FailureClass::ServerError => "server-error",
            FailureClass::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during sync operations.
///
/// Connectors construct the fetch-side variants (`TransientNetwork`,
/// `RateLimited`, `ServerError`, `Fatal`); the classification travels with
/// the error so the retrying fetcher never needs to inspect wire details.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transient network failure (connection reset, timeout, truncation).
    #[error("transient network error: {message}")]
    TransientNetwork {
        /// Error message.
        message: String,
    },

    /// The source rejected the request due to rate limiting.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Error message.
        message: String,
        /// Server-provided wait hint, if any.
        retry_after: Option<Duration>,
    },

    /// The source failed server-side.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP-style status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Non-retryable failure (bad request, broken mapping, auth).
    #[error("fatal error: {message}")]
    Fatal {
        /// Error message.
        message: String,
    },

    /// A quality gate rejected a loaded partition.
    #[error("quality violation: {}", violations.join("; "))]
    QualityViolation {
        /// Human-readable violation messages.
        violations: Vec<String>,
    },

    /// All retry attempts were used up.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The final error observed.
        #[source]
        last: Box<SyncError>,
    },

    /// Checkpoint store failure.
    #[error("checkpoint store error: {message}")]
    Checkpoint {
        /// Error message.
        message: String,
    },

    /// The job was cancelled by the caller.
    #[error("sync cancelled")]
    Cancelled,

    /// Attempted an operation from a job status that forbids it.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current status.
        from: String,
        /// Attempted target.
        to: String,
    },
}

impl SyncError {
    /// Creates a transient network error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    /// Creates a rate-limit error with an optional server wait hint.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a retryable server-side error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Creates a non-retryable error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Creates a checkpoint store error.
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Returns the failure class of this error.
    ///
    /// Errors outside the fetch path (quality violations, cancellation,
    /// checkpoint failures) classify as `Fatal`: the retry policy must
    /// never absorb them.
    pub fn class(&self) -> FailureClass {
        match self {
            SyncError::TransientNetwork { .. } => FailureClass::TransientNetwork,
            SyncError::RateLimited { .. } => FailureClass::RateLimited,
            SyncError::ServerError { .. } => FailureClass::ServerError,
            _ => FailureClass::Fatal,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Returns the server-provided wait hint, if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            SyncError::transient("reset").class(),
            FailureClass::TransientNetwork
        );
        assert_eq!(
            SyncError::rate_limited("429", None).class(),
            FailureClass::RateLimited
        );
        assert_eq!(
            SyncError::server(503, "unavailable").class(),
            FailureClass::ServerError
        );
        assert_eq!(SyncError::fatal("bad auth").class(), FailureClass::Fatal);
        assert_eq!(SyncError::Cancelled.class(), FailureClass::Fatal);
    }

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transient("timeout").is_retryable());
        assert!(SyncError::rate_limited("slow down", None).is_retryable());
        assert!(SyncError::server(500, "oops").is_retryable());
        assert!(!SyncError::fatal("400 bad request").is_retryable());
        assert!(!SyncError::QualityViolation {
            violations: vec!["count mismatch".into()]
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn retry_after_hint() {
        let hint = Duration::from_secs(7);
        let err = SyncError::rate_limited("429", Some(hint));
        assert_eq!(err.retry_after(), Some(hint));
        assert_eq!(SyncError::transient("reset").retry_after(), None);
    }

    #[test]
    fn exhausted_carries_last_error() {
        let err = SyncError::RetriesExhausted {
            attempts: 5,
            last: Box::new(SyncError::transient("connection reset")),
        };
        let text = err.to_string();
        assert!(text.contains("5 attempts"));
        assert!(text.contains("connection reset"));
    }
}
