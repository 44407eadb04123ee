//! Tests for the usage tracker and rate limiter under the Tokio clock.

use colloquy_core::{TokenUsage, UsageRecord};
use colloquy_rate_limit::{RateLimiter, Tier, TierConfig, UsageTracker};
use std::time::Duration;

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

#[tokio::test(start_paused = true)]
async fn test_usage_rates_follow_paused_clock() {
    let tracker = UsageTracker::with_retention(Duration::from_secs(600));

    tracker.record(UsageRecord::live(now(), TokenUsage::new(500, 500)));
    tokio::time::advance(Duration::from_secs(30)).await;
    tracker.record(UsageRecord::live(now(), TokenUsage::new(500, 500)));
    tracker.record(UsageRecord::cached(now(), TokenUsage::new(10_000, 0)));
    tracker.flush().await;

    let rates = tracker.usage_rates(Duration::from_secs(60));
    // 2000 live tokens over the 30 seconds the records span.
    assert!((rates.tokens_per_minute() - 4000.0).abs() < 1e-6);
    assert_eq!(*rates.sampled_requests(), 2);

    let totals = tracker.totals();
    assert_eq!(*totals.live_requests(), 2);
    assert_eq!(*totals.cached_requests(), 1);
    assert_eq!(totals.tokens(), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_old_usage_leaves_window() {
    let tracker = UsageTracker::with_retention(Duration::from_secs(600));
    tracker.record(UsageRecord::live(now(), TokenUsage::new(1000, 0)));
    tracker.flush().await;

    tokio::time::advance(Duration::from_secs(120)).await;
    let rates = tracker.usage_rates(Duration::from_secs(60));
    assert_eq!(*rates.sampled_requests(), 0);
    assert_eq!(*rates.tokens_per_minute(), 0.0);
}

#[tokio::test]
async fn test_limiter_concurrency_cap() {
    let tier = TierConfig {
        max_concurrent: Some(2),
        ..TierConfig::unlimited()
    };
    let limiter = RateLimiter::new(tier);

    let a = limiter.acquire(10).await;
    let _b = limiter.acquire(10).await;
    assert!(limiter.try_acquire(10).is_none());
    drop(a);
    assert!(limiter.try_acquire(10).is_some());
}

#[tokio::test]
async fn test_limiter_clamps_oversized_token_estimates() {
    let tier = TierConfig {
        tpm: Some(1_000),
        ..TierConfig::unlimited()
    };
    let limiter = RateLimiter::new(tier);
    // Larger than the whole per-minute budget; must not hang or fail.
    let _guard = limiter.acquire(50_000).await;
    assert_eq!(limiter.inner().name(), "Unlimited");
}
