//! Sliding-window usage log and throughput rates.

use crate::{EventTracker, TrackerState};
use colloquy_core::UsageRecord;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_RETENTION: Duration = Duration::from_secs(600);
const MIN_ELAPSED: Duration = Duration::from_secs(1);

/// Cumulative counts since the tracker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_getters::Getters)]
pub struct UsageTotals {
    live_requests: u64,
    cached_requests: u64,
    input_tokens: u64,
    output_tokens: u64,
}

impl UsageTotals {
    /// Live and cached requests together.
    pub fn requests(&self) -> u64 {
        self.live_requests + self.cached_requests
    }

    /// Tokens spent on live calls.
    pub fn tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Throughput over a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, derive_getters::Getters)]
pub struct UsageRates {
    tokens_per_minute: f64,
    requests_per_minute: f64,
    sampled_requests: usize,
}

/// Usage records kept for a bounded retention period.
#[derive(Debug, Clone)]
pub struct UsageLog {
    records: VecDeque<UsageRecord>,
    retention: Duration,
    totals: UsageTotals,
}

impl Default for UsageLog {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl UsageLog {
    /// An empty log keeping records for `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            retention,
            totals: UsageTotals::default(),
        }
    }

    /// Cumulative counts.
    pub fn totals(&self) -> UsageTotals {
        self.totals
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rates of live calls finished within `window` before `now`.
    ///
    /// Rates are extrapolated from the time the sampled records actually span,
    /// measured from the earliest of them to `now` and never less than one
    /// second, so a run that just started is not reported as idle.
    pub fn usage_rates_at(&self, now: Instant, window: Duration) -> UsageRates {
        let cutoff = now.checked_sub(window);
        let sampled: Vec<&UsageRecord> = self
            .records
            .iter()
            .filter(|r| !r.cached_response)
            .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
            .filter(|r| r.timestamp <= now)
            .collect();

        let Some(earliest) = sampled.iter().map(|r| r.timestamp).min() else {
            return UsageRates::default();
        };

        let elapsed = now.saturating_duration_since(earliest).max(MIN_ELAPSED);
        let minutes = elapsed.as_secs_f64() / 60.0;
        let tokens: u64 = sampled.iter().map(|r| r.tokens.total()).sum();

        UsageRates {
            tokens_per_minute: tokens as f64 / minutes,
            requests_per_minute: sampled.len() as f64 / minutes,
            sampled_requests: sampled.len(),
        }
    }

    fn prune(&mut self, latest: Instant) {
        let Some(horizon) = latest.checked_sub(self.retention) else {
            return;
        };
        while self.records.front().is_some_and(|r| r.timestamp < horizon) {
            self.records.pop_front();
        }
    }
}

impl TrackerState for UsageLog {
    type Event = UsageRecord;

    fn apply(&mut self, record: UsageRecord) {
        if record.cached_response {
            self.totals.cached_requests += 1;
        } else {
            self.totals.live_requests += 1;
            self.totals.input_tokens += record.tokens.input_tokens;
            self.totals.output_tokens += record.tokens.output_tokens;
        }
        self.records.push_back(record);
        self.prune(record.timestamp);
    }
}

/// Tracker of model usage shared by every worker of a run.
pub type UsageTracker = EventTracker<UsageLog>;

impl EventTracker<UsageLog> {
    /// Start a usage tracker that retains records for `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self::with_initial(UsageLog::with_retention(retention))
    }

    /// Current rates over the trailing `window`, on the Tokio clock.
    pub fn usage_rates(&self, window: Duration) -> UsageRates {
        let now = tokio::time::Instant::now().into_std();
        self.with_state(|log| log.usage_rates_at(now, window))
    }

    /// Cumulative counts.
    pub fn totals(&self) -> UsageTotals {
        self.with_state(UsageLog::totals)
    }
}
