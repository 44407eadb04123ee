//! Randomized backoff for re-enqueued work.

use crate::RetryConfig;
use std::time::Duration;
use tokio_retry2::strategy::{FibonacciBackoff, jitter};

/// Delay schedule for retrying rate-limit-class failures.
///
/// Delays grow along a Fibonacci sequence from `initial` up to `max`, each
/// scaled by a random factor so that a burst of throttled items does not
/// come back at the same instant.
#[derive(Debug, Clone, PartialEq, derive_getters::Getters)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    max_retries: u32,
}

impl BackoffPolicy {
    /// Build a policy from explicit bounds.
    pub fn new(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_retries,
        }
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay before attempt number `attempt` (1-based count of failures so far).
    ///
    /// A server-provided `retry_after` takes precedence when it is longer than
    /// the computed delay. The result never exceeds `max`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = FibonacciBackoff::from_millis(self.initial_millis())
            .max_delay(self.max)
            .map(jitter)
            .nth(attempt.saturating_sub(1) as usize)
            .unwrap_or(self.max);

        match retry_after {
            Some(hint) if hint > computed => hint.min(self.max),
            _ => computed.min(self.max),
        }
    }

    fn initial_millis(&self) -> u64 {
        (self.initial.as_millis().min(u64::MAX as u128) as u64).max(1)
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(*config.initial_backoff_ms()),
            Duration::from_secs(*config.max_backoff_secs()),
            *config.max_retries(),
        )
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
