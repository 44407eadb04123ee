//! Top-level error wrapper types.

use crate::{CacheError, ConfigError, JobError, ModelError, RetryableError, ValidationError};
use std::time::Duration;

/// Every error condition the Colloquy crates can raise.
///
/// # Examples
///
/// ```
/// use colloquy_error::{ColloquyError, ConfigError};
///
/// let err: ColloquyError = ConfigError::new("bad value").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum ColloquyErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Model call error
    #[from(ModelError)]
    Model(ModelError),
    /// Answer validation error
    #[from(ValidationError)]
    Validation(ValidationError),
    /// Response cache error
    #[from(CacheError)]
    Cache(CacheError),
    /// Job execution error
    #[from(JobError)]
    Job(JobError),
}

/// Colloquy error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Colloquy Error: {}", _0)]
pub struct ColloquyError(Box<ColloquyErrorKind>);

impl ColloquyError {
    /// Create a new error from a kind.
    pub fn new(kind: ColloquyErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ColloquyErrorKind {
        &self.0
    }

    /// Whether this is an answer validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), ColloquyErrorKind::Validation(_))
    }
}

impl RetryableError for ColloquyError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            ColloquyErrorKind::Model(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn is_rate_limit(&self) -> bool {
        match self.kind() {
            ColloquyErrorKind::Model(e) => e.is_rate_limit(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.kind() {
            ColloquyErrorKind::Model(e) => e.retry_after(),
            _ => None,
        }
    }
}

// Generic From implementation for any type that converts to ColloquyErrorKind
impl<T> From<T> for ColloquyError
where
    T: Into<ColloquyErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Colloquy operations.
pub type ColloquyResult<T> = std::result::Result<T, ColloquyError>;
