//! Model call errors and retry classification.

use std::time::Duration;

/// Failure conditions of a model call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ModelErrorKind {
    /// Provider throughput quota exceeded (HTTP 429 or equivalent)
    #[display("Rate limited: {}", message)]
    RateLimited {
        /// Provider-suggested wait before retrying, when one was sent
        retry_after_ms: Option<u64>,
        /// Error message
        message: String,
    },
    /// HTTP error with status code and message
    #[display("HTTP {} error: {}", status_code, message)]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },
    /// Connection-level failure before a status code was received
    #[display("Transport failure: {}", _0)]
    Transport(String),
    /// The call did not finish within the configured per-call timeout
    #[display("Model call timed out after {}s", _0)]
    Timeout(u64),
    /// The provider answered with a body we could not interpret
    #[display("Malformed response: {}", _0)]
    MalformedResponse(String),
    /// API key environment variable not set
    #[display("API key environment variable {} not set", _0)]
    MissingApiKey(String),
}

impl ModelErrorKind {
    /// Whether this failure belongs to the rate-limit class.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ModelErrorKind::RateLimited { .. } => true,
            ModelErrorKind::Http { status_code, .. } => *status_code == 429,
            _ => false,
        }
    }

    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelErrorKind::RateLimited { .. } => true,
            ModelErrorKind::Http { status_code, .. } => {
                matches!(*status_code, 408 | 429 | 500 | 502 | 503 | 504)
            }
            ModelErrorKind::Transport(_) => true,
            ModelErrorKind::Timeout(_) => true,
            ModelErrorKind::MalformedResponse(_) | ModelErrorKind::MissingApiKey(_) => false,
        }
    }

    /// Provider-suggested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ModelErrorKind::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Model call error with source location tracking.
///
/// # Examples
///
/// ```
/// use colloquy_error::{ModelError, ModelErrorKind, RetryableError};
///
/// let err = ModelError::new(ModelErrorKind::RateLimited {
///     retry_after_ms: Some(1500),
///     message: "slow down".to_string(),
/// });
/// assert!(err.is_retryable());
/// assert!(err.kind.is_rate_limit());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Model Error: {} at line {} in {}", kind, line, file)]
pub struct ModelError {
    /// The kind of error that occurred
    pub kind: ModelErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ModelError {
    /// Create a new ModelError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ModelErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}

/// Trait for errors that support retry logic.
///
/// Transient errors (rate limits, 5xx, timeouts, dropped connections) return
/// true from `is_retryable`; permanent errors (bad requests, validation
/// failures, missing credentials) return false.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    fn is_retryable(&self) -> bool;

    /// Returns true if this error signals an exceeded provider quota.
    fn is_rate_limit(&self) -> bool {
        false
    }

    /// Provider-suggested wait before retrying, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for ModelError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn is_rate_limit(&self) -> bool {
        self.kind.is_rate_limit()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.kind.retry_after()
    }
}
