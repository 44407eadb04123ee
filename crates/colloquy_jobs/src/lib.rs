//! Concurrent interview execution.
//!
//! A job is the cross product of agents, scenarios and models, each asked the
//! same survey `n` times. This crate turns a job into results:
//!
//! - [`NParameterHandler`] decides when a provider's native multi-completion
//!   parameter can serve several repetitions in one call
//! - [`InterviewGenerator`] lazily yields [`WorkItem`]s with dense, unique
//!   original indices
//! - [`ExecutionEngine`] runs work items on a growable worker pool with
//!   rate limiting, retries, per-call timeouts and cooperative cancellation,
//!   emitting completions out of order
//! - [`ResultCollector`] restores index order and releases per-item state in
//!   batches
//! - [`JobRunner`] wires everything together, reports progress and exposes a
//!   blocking [`run`](JobRunner::run) and a streaming
//!   [`stream`](JobRunner::stream) entry point

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod collector;
mod engine;
mod executor;
mod generator;
mod job;
mod n_param;
mod pool;
mod progress;
mod results;
mod runner;
mod task;
mod work_item;

pub use collector::{ResultCollector, release_batch_size};
pub use engine::{CompletedItem, EngineSummary, ExecutionEngine};
pub use generator::InterviewGenerator;
pub use job::{Interview, JobSpec, ModelRef};
pub use n_param::NParameterHandler;
pub use pool::WorkerPool;
pub use progress::{LoggingProgressObserver, ProgressObserver, TrackerSnapshot};
pub use results::{
    ExceptionRecord, FailureKind, FailureMarker, InterviewRecord, InterviewResult, Results,
    TaskHistory,
};
pub use runner::{JobRunner, run, stream};
pub use task::{TaskCounters, TaskEvent, TaskTracker};
pub use work_item::{CompletionPlan, Exchange, ExecutionState, WorkItem};
