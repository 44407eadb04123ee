//! Rate limiter implementation using governor and Tokio Semaphore.
//!
//! This module provides the `RateLimiter` struct which enforces rate limits using:
//! - Governor crate (GCRA algorithm) for RPM and TPM limits
//! - Tokio Semaphore for concurrent request limits

use crate::Tier;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter that enforces per-minute quotas and a concurrency cap.
///
/// - **RPM** (requests per minute): Enforced via governor
/// - **TPM** (tokens per minute): Enforced via governor, one cell per token
/// - **Concurrent requests**: Enforced via Tokio Semaphore
///
/// Cloning is cheap; clones share the same quotas.
#[derive(Clone)]
pub struct RateLimiter<T: Tier> {
    inner: Arc<T>,
    rpm_limiter: Option<Arc<DirectRateLimiter>>,
    tpm_limiter: Option<Arc<DirectRateLimiter>>,
    tpm_capacity: Option<NonZeroU32>,
    concurrent_semaphore: Option<Arc<Semaphore>>,
}

impl<T: Tier> std::fmt::Debug for RateLimiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tier", &self.inner.name())
            .field("rpm", &self.inner.rpm())
            .field("tpm", &self.inner.tpm())
            .field("max_concurrent", &self.inner.max_concurrent())
            .finish()
    }
}

impl<T: Tier> RateLimiter<T> {
    /// Create a new rate limiter from a tier.
    ///
    /// Every non-`None` limit of the tier is enforced.
    pub fn new(tier: T) -> Self {
        let rpm_limiter = tier.rpm().and_then(NonZeroU32::new).map(|n| {
            Arc::new(GovernorRateLimiter::direct(Quota::per_minute(n)))
        });

        // Governor counts in u32 cells, so very large TPM values are capped.
        let tpm_capacity = tier
            .tpm()
            .and_then(|tpm| NonZeroU32::new(tpm.min(u32::MAX as u64) as u32));
        let tpm_limiter =
            tpm_capacity.map(|n| Arc::new(GovernorRateLimiter::direct(Quota::per_minute(n))));

        let concurrent_semaphore = tier
            .max_concurrent()
            .map(|max| Arc::new(Semaphore::new(max.max(1) as usize)));

        Self {
            inner: Arc::new(tier),
            rpm_limiter,
            tpm_limiter,
            tpm_capacity,
            concurrent_semaphore,
        }
    }

    /// The tier this limiter was built from.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Wait until every configured limit admits a request of `estimated_tokens`.
    ///
    /// Returns a guard that releases the concurrent slot when dropped.
    pub async fn acquire(&self, estimated_tokens: u64) -> RateLimiterGuard {
        if let Some(limiter) = &self.rpm_limiter {
            limiter.until_ready().await;
        }

        if let (Some(limiter), Some(capacity)) = (&self.tpm_limiter, self.tpm_capacity) {
            let tokens = self.clamp_tokens(estimated_tokens, capacity);
            if limiter.until_n_ready(tokens).await.is_err() {
                // Unreachable after clamping; admit rather than stall.
                warn!(tokens = tokens.get(), "Token request exceeds TPM burst capacity");
            }
        }

        // Concurrency slot last so it is never held while waiting on quotas.
        let permit = match &self.concurrent_semaphore {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        RateLimiterGuard { _permit: permit }
    }

    /// Try to acquire without waiting.
    ///
    /// Returns `None` if any rate limit would block.
    pub fn try_acquire(&self, estimated_tokens: u64) -> Option<RateLimiterGuard> {
        if let Some(limiter) = &self.rpm_limiter {
            limiter.check().ok()?;
        }

        if let (Some(limiter), Some(capacity)) = (&self.tpm_limiter, self.tpm_capacity) {
            let tokens = self.clamp_tokens(estimated_tokens, capacity);
            limiter.check_n(tokens).ok()?.ok()?;
        }

        let permit = match &self.concurrent_semaphore {
            Some(semaphore) => Some(semaphore.clone().try_acquire_owned().ok()?),
            None => None,
        };

        Some(RateLimiterGuard { _permit: permit })
    }

    fn clamp_tokens(&self, estimated_tokens: u64, capacity: NonZeroU32) -> NonZeroU32 {
        let wanted = estimated_tokens.min(capacity.get() as u64) as u32;
        if (wanted as u64) < estimated_tokens {
            debug!(
                estimated_tokens,
                capacity = capacity.get(),
                "Clamping token estimate to TPM capacity"
            );
        }
        NonZeroU32::new(wanted).unwrap_or(NonZeroU32::MIN)
    }
}

/// RAII guard for rate limiter.
///
/// Releases the concurrent request slot when dropped, including on error or
/// cancellation of the request future.
#[derive(Debug)]
pub struct RateLimiterGuard {
    _permit: Option<OwnedSemaphorePermit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TierConfig;

    fn tier(max_concurrent: Option<u32>) -> TierConfig {
        TierConfig {
            max_concurrent,
            ..TierConfig::unlimited()
        }
    }

    #[tokio::test]
    async fn unlimited_tier_never_blocks() {
        let limiter = RateLimiter::new(TierConfig::unlimited());
        let guards: Vec<_> = (0..100).filter_map(|_| limiter.try_acquire(10_000)).collect();
        assert_eq!(guards.len(), 100);
    }

    #[tokio::test]
    async fn concurrency_slot_released_on_drop() {
        let limiter = RateLimiter::new(tier(Some(1)));
        let guard = limiter.acquire(1).await;
        assert!(limiter.try_acquire(1).is_none());
        drop(guard);
        assert!(limiter.try_acquire(1).is_some());
    }
}
