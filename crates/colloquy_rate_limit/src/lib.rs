//! Configuration, rate limiting and usage tracking.
//!
//! This crate provides:
//! - Layered TOML configuration (`ColloquyConfig`) with bundled defaults and
//!   user overrides, including the per-provider native-N capability table
//! - Per-tier rate limiting (`RateLimiter`) using governor and a semaphore
//! - Randomized backoff for retryable failures (`BackoffPolicy`)
//! - Event-sourced trackers (`EventTracker`) and the sliding-window
//!   `UsageTracker` that measures throughput against configured limits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod limiter;
mod retry;
mod tier;
mod tracker;
mod usage;

pub use config::{
    CollectorConfig, ColloquyConfig, ConcurrencyConfig, ModelTierConfig, ProviderConfig,
    RetryConfig, RunSettings, TierConfig,
};
pub use limiter::{RateLimiter, RateLimiterGuard};
pub use retry::BackoffPolicy;
pub use tier::Tier;
pub use tracker::{EventTracker, TrackerState};
pub use usage::{UsageLog, UsageRates, UsageTotals, UsageTracker};
