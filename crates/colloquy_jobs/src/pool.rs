//! Worker pool with one-directional growth.

use colloquy_rate_limit::UsageTracker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bound on concurrently running work items.
///
/// The pool only grows. A supervisor adds one worker per sampling interval
/// while measured throughput stays under the growth threshold; once the
/// threshold is crossed the ceiling is latched for the rest of the run.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: Arc<AtomicUsize>,
    max_workers: usize,
    ceiling_reached: Arc<AtomicBool>,
}

impl WorkerPool {
    /// A pool of `initial` workers that may grow to `max_workers`.
    pub fn new(initial: usize, max_workers: usize) -> Self {
        let initial = initial.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(initial)),
            size: Arc::new(AtomicUsize::new(initial)),
            max_workers: max_workers.max(initial),
            ceiling_reached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current number of workers.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Upper bound on workers.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Whether growth has been stopped for good.
    pub fn ceiling_reached(&self) -> bool {
        self.ceiling_reached.load(Ordering::Acquire)
    }

    /// Wait for a free worker slot.
    ///
    /// Returns `None` only if the pool has been closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Add one worker unless the ceiling is latched or the pool is full.
    pub fn grow(&self) -> bool {
        if self.ceiling_reached() {
            return false;
        }
        let grown = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                (size < self.max_workers).then_some(size + 1)
            })
            .is_ok();
        if grown {
            self.semaphore.add_permits(1);
        }
        grown
    }

    /// Stop growth for the rest of the run.
    pub fn latch_ceiling(&self) {
        if !self.ceiling_reached.swap(true, Ordering::AcqRel) {
            info!(workers = self.size(), "Throughput threshold reached; worker pool frozen");
        }
    }

    /// Apply one throughput sample.
    ///
    /// `utilization` is the observed fraction of the configured limit.
    pub fn observe(&self, utilization: f64, growth_threshold: f64) {
        if utilization >= growth_threshold {
            self.latch_ceiling();
        } else if self.grow() {
            debug!(workers = self.size(), utilization, "Grew worker pool");
        }
    }

    /// Spawn the supervisor that samples `usage` every `interval`.
    ///
    /// Utilization is the larger of tokens-per-minute and
    /// requests-per-minute over their limits; with neither limit known it is
    /// zero. The task ends when `stop` is cancelled.
    pub(crate) fn supervise(
        &self,
        usage: UsageTracker,
        limits: ThroughputLimits,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limits.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let rates = usage.usage_rates(limits.window);
                        let utilization = limits.utilization(
                            *rates.tokens_per_minute(),
                            *rates.requests_per_minute(),
                        );
                        pool.observe(utilization, limits.growth_threshold);
                    }
                }
            }
            debug!(workers = pool.size(), "Pool supervisor stopped");
        })
    }
}

/// Limits the pool supervisor measures throughput against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ThroughputLimits {
    pub tokens_per_minute: Option<u64>,
    pub requests_per_minute: Option<u64>,
    pub growth_threshold: f64,
    pub sample_interval: Duration,
    pub window: Duration,
}

impl ThroughputLimits {
    pub fn utilization(&self, tpm: f64, rpm: f64) -> f64 {
        let ratio = |rate: f64, limit: Option<u64>| match limit {
            Some(limit) if limit > 0 => rate / limit as f64,
            _ => 0.0,
        };
        ratio(tpm, self.tokens_per_minute).max(ratio(rpm, self.requests_per_minute))
    }
}
