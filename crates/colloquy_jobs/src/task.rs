//! Task counters for progress reporting.

use colloquy_rate_limit::{EventTracker, TrackerState};
use serde::Serialize;

/// Lifecycle events of work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// An item was pulled from the generator
    Queued,
    /// An attempt started on a worker
    Started,
    /// An attempt finished and produced this many results
    Completed {
        /// Logical results produced
        results: usize,
    },
    /// An attempt finished with failure placeholders
    Failed {
        /// Logical results covered by the placeholders
        results: usize,
    },
    /// An attempt failed and the item was scheduled again
    Retried,
    /// An item waiting on backoff was dropped by cancellation
    Abandoned,
}

/// Counters folded from task events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_getters::Getters)]
pub struct TaskCounters {
    queued: u64,
    started: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    abandoned: u64,
    active: u64,
    results: u64,
}

impl TaskCounters {
    /// Items that reached a final outcome.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

impl TrackerState for TaskCounters {
    type Event = TaskEvent;

    fn apply(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Queued => self.queued += 1,
            TaskEvent::Started => {
                self.started += 1;
                self.active += 1;
            }
            TaskEvent::Completed { results } => {
                self.completed += 1;
                self.results += results as u64;
                self.active = self.active.saturating_sub(1);
            }
            TaskEvent::Failed { results } => {
                self.failed += 1;
                self.results += results as u64;
                self.active = self.active.saturating_sub(1);
            }
            TaskEvent::Retried => {
                self.retried += 1;
                self.active = self.active.saturating_sub(1);
            }
            TaskEvent::Abandoned => self.abandoned += 1,
        }
    }
}

/// Tracker of work item lifecycle shared by the engine and its workers.
pub type TaskTracker = EventTracker<TaskCounters>;
