//! API usage records.

use crate::TokenUsage;
use std::time::Instant;

/// One model call (or cache hit) as seen by the usage tracker.
///
/// Records are immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    /// When the call finished
    pub timestamp: Instant,
    /// Tokens consumed
    pub tokens: TokenUsage,
    /// Whether the response came from the cache
    pub cached_response: bool,
}

impl UsageRecord {
    /// A live call finished at `timestamp`.
    pub fn live(timestamp: Instant, tokens: TokenUsage) -> Self {
        Self {
            timestamp,
            tokens,
            cached_response: false,
        }
    }

    /// A cache hit served at `timestamp`.
    pub fn cached(timestamp: Instant, tokens: TokenUsage) -> Self {
        Self {
            timestamp,
            tokens,
            cached_response: true,
        }
    }
}
