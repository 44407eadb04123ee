//! Progress reporting.

use crate::{InterviewResult, Results, TaskCounters};
use colloquy_rate_limit::{UsageRates, UsageTotals};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Point-in-time view of a running job.
#[derive(Debug, Clone, PartialEq, Serialize, derive_getters::Getters)]
pub struct TrackerSnapshot {
    tasks: TaskCounters,
    usage: UsageRates,
    totals: UsageTotals,
    pool_size: usize,
    expected_results: usize,
    captured: usize,
    elapsed: Duration,
}

impl TrackerSnapshot {
    /// Assemble a snapshot.
    pub fn new(
        tasks: TaskCounters,
        usage: UsageRates,
        totals: UsageTotals,
        pool_size: usize,
        expected_results: usize,
        captured: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            tasks,
            usage,
            totals,
            pool_size,
            expected_results,
            captured,
            elapsed,
        }
    }

    /// Fraction of expected results captured, in `0.0..=1.0`.
    pub fn fraction_complete(&self) -> f64 {
        if self.expected_results == 0 {
            return 1.0;
        }
        (self.captured as f64 / self.expected_results as f64).min(1.0)
    }
}

/// Receives progress while a job runs.
///
/// Callbacks run on the coordinating task and should return quickly.
pub trait ProgressObserver: Send + Sync {
    /// Called on every progress tick.
    fn on_progress(&self, snapshot: &TrackerSnapshot);

    /// Called when a result is captured.
    fn on_result(&self, _result: &InterviewResult) {}

    /// Called once with the final results.
    fn on_finish(&self, _results: &Results) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgressObserver;

impl ProgressObserver for LoggingProgressObserver {
    fn on_progress(&self, snapshot: &TrackerSnapshot) {
        info!(
            captured = snapshot.captured,
            expected = snapshot.expected_results,
            percent = %format!("{:.1}", snapshot.fraction_complete() * 100.0),
            active = snapshot.tasks.active(),
            retried = snapshot.tasks.retried(),
            failed = snapshot.tasks.failed(),
            workers = snapshot.pool_size,
            tpm = %format!("{:.0}", snapshot.usage.tokens_per_minute()),
            rpm = %format!("{:.1}", snapshot.usage.requests_per_minute()),
            elapsed_secs = snapshot.elapsed.as_secs(),
            "Progress"
        );
    }

    fn on_finish(&self, results: &Results) {
        info!(
            results = results.len(),
            expected = results.expected(),
            partial = results.is_partial(),
            failures = results.task_history().exceptions().len(),
            "Job finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_clamped() {
        let snapshot = TrackerSnapshot::new(
            TaskCounters::default(),
            UsageRates::default(),
            UsageTotals::default(),
            1,
            4,
            5,
            Duration::ZERO,
        );
        assert_eq!(snapshot.fraction_complete(), 1.0);

        let empty = TrackerSnapshot::new(
            TaskCounters::default(),
            UsageRates::default(),
            UsageTotals::default(),
            1,
            0,
            0,
            Duration::ZERO,
        );
        assert_eq!(empty.fraction_complete(), 1.0);
    }
}
