//! Concurrent execution of work items.

use crate::executor::{AttemptOutcome, InterviewExecutor, failed};
use crate::pool::ThroughputLimits;
use crate::{
    ExceptionRecord, FailureKind, InterviewGenerator, InterviewResult, JobSpec, NParameterHandler,
    TaskEvent, TaskTracker, WorkItem, WorkerPool,
};
use colloquy_error::{ColloquyError, ColloquyResult, JobError, JobErrorKind};
use colloquy_interface::AnswerValidator;
use colloquy_rate_limit::{ColloquyConfig, UsageTracker};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A work item that reached its final outcome, with the results it produced.
///
/// An item coming from the engine holds its worker slot until it is dropped,
/// so the pool never runs ahead of the consumer.
#[derive(Debug)]
pub struct CompletedItem {
    item: WorkItem,
    results: Vec<InterviewResult>,
    exceptions: Vec<ExceptionRecord>,
    error: Option<ColloquyError>,
    permit: Option<OwnedSemaphorePermit>,
}

impl CompletedItem {
    /// Bundle an item with its outcome.
    pub fn new(
        item: WorkItem,
        results: Vec<InterviewResult>,
        exceptions: Vec<ExceptionRecord>,
        error: Option<ColloquyError>,
    ) -> Self {
        Self {
            item,
            results,
            exceptions,
            error,
            permit: None,
        }
    }

    pub(crate) fn holding(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// The finished item.
    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    /// One result per original index the item covers.
    pub fn results(&self) -> &[InterviewResult] {
        &self.results
    }

    /// Failures observed while running the item.
    pub fn exceptions(&self) -> &[ExceptionRecord] {
        &self.exceptions
    }

    /// The first error the item hit, if any.
    pub fn error(&self) -> Option<&ColloquyError> {
        self.error.as_ref()
    }

    /// Take the error out, leaving `None`.
    pub fn take_error(&mut self) -> Option<ColloquyError> {
        self.error.take()
    }

    /// Split into parts.
    pub fn into_parts(
        self,
    ) -> (
        WorkItem,
        Vec<InterviewResult>,
        Vec<ExceptionRecord>,
        Option<ColloquyError>,
    ) {
        (self.item, self.results, self.exceptions, self.error)
    }
}

/// What the engine did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_getters::Getters)]
pub struct EngineSummary {
    items_completed: usize,
    items_failed: usize,
    results_emitted: usize,
    retries: usize,
    cancelled: bool,
    pool_size: usize,
}

/// Runs work items on a growable worker pool.
///
/// Items are pulled lazily from the generator as workers free up, so memory
/// stays proportional to the pool size rather than the job size. Finished
/// items are sent on the sink in completion order. Retryable failures sleep
/// off their backoff outside the pool and come back ahead of fresh work.
///
/// Cancellation stops new items from starting; items already running are
/// allowed to finish and their results are still delivered.
pub struct ExecutionEngine {
    config: ColloquyConfig,
    handler: Arc<NParameterHandler>,
    validator: Arc<dyn AnswerValidator>,
    usage: UsageTracker,
    tasks: TaskTracker,
    pool: WorkerPool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("pool", &self.pool)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ExecutionEngine {
    /// Engine with fresh trackers and a pool sized from `config`.
    pub fn new(
        config: ColloquyConfig,
        handler: Arc<NParameterHandler>,
        validator: Arc<dyn AnswerValidator>,
        cancel: CancellationToken,
    ) -> Self {
        let concurrency = &config.concurrency;
        let pool = WorkerPool::new(*concurrency.initial_workers(), *concurrency.max_workers());
        let usage = UsageTracker::with_retention(concurrency.usage_retention());
        Self {
            config,
            handler,
            validator,
            usage,
            tasks: TaskTracker::new(),
            pool,
            cancel,
        }
    }

    /// Usage tracker fed by every model call and cache hit.
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Tracker of work item lifecycle events.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run every item the generator yields.
    ///
    /// # Errors
    ///
    /// With `stop_on_exception` set, returns the first item error after the
    /// failing item has been sent and outstanding work aborted.
    pub async fn execute(
        &self,
        job: &JobSpec,
        generator: InterviewGenerator,
        sink: mpsc::Sender<CompletedItem>,
    ) -> ColloquyResult<EngineSummary> {
        let executor = Arc::new(InterviewExecutor::new(
            &self.config,
            job,
            Arc::clone(&self.handler),
            Arc::clone(&self.validator),
            self.usage.clone(),
            self.tasks.clone(),
        ));

        let stop_supervisor = self.cancel.child_token();
        let supervisor = self.pool.supervise(
            self.usage.clone(),
            self.throughput_limits(job),
            stop_supervisor.clone(),
        );

        let outcome = self.drive(executor, generator, sink).await;

        stop_supervisor.cancel();
        if let Err(e) = supervisor.await {
            warn!(error = %e, "Pool supervisor ended abnormally");
        }
        outcome
    }

    async fn drive(
        &self,
        executor: Arc<InterviewExecutor>,
        mut generator: InterviewGenerator,
        sink: mpsc::Sender<CompletedItem>,
    ) -> ColloquyResult<EngineSummary> {
        let stop_on_exception = *self.config.run.stop_on_exception();
        let mut workers: JoinSet<(AttemptOutcome, OwnedSemaphorePermit)> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, WorkItem> = HashMap::new();
        let mut sleepers: JoinSet<WorkItem> = JoinSet::new();
        let mut ready: VecDeque<WorkItem> = VecDeque::new();
        let mut exhausted = false;
        let mut stopping = false;
        let mut summary = EngineSummary::default();

        loop {
            let has_work = !stopping && (!ready.is_empty() || !exhausted);
            if workers.is_empty() && sleepers.is_empty() && !has_work {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !stopping => {
                    stopping = true;
                    summary.cancelled = true;
                    let abandoned = sleepers.len() + ready.len();
                    info!(
                        running = workers.len(),
                        abandoned,
                        "Cancellation requested; letting running items finish"
                    );
                    sleepers.shutdown().await;
                    ready.clear();
                    for _ in 0..abandoned {
                        self.tasks.record(TaskEvent::Abandoned);
                    }
                }

                Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                    let completed = match joined {
                        Ok((id, (AttemptOutcome::Finished(completed), permit))) => {
                            in_flight.remove(&id);
                            completed.holding(permit)
                        }
                        Ok((id, (AttemptOutcome::Retry { item, delay }, _permit))) => {
                            in_flight.remove(&id);
                            summary.retries += 1;
                            if stopping {
                                self.tasks.record(TaskEvent::Abandoned);
                            } else {
                                sleepers.spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    item
                                });
                            }
                            continue;
                        }
                        Err(join_error) => {
                            let Some(item) = in_flight.remove(&join_error.id()) else {
                                continue;
                            };
                            if !join_error.is_panic() {
                                debug!(item = %item, "Worker aborted");
                                continue;
                            }
                            error!(item = %item, error = %join_error, "Worker panicked");
                            let panicked = JobError::new(JobErrorKind::WorkerPanicked(join_error.to_string()));
                            failed(item, FailureKind::Crashed, panicked.into(), &self.tasks)
                        }
                    };

                    if completed.error().is_some() {
                        summary.items_failed += 1;
                    } else {
                        summary.items_completed += 1;
                    }
                    summary.results_emitted += completed.results().len();

                    let mut completed = completed;
                    let halt = if stop_on_exception { completed.take_error() } else { None };

                    if sink.send(completed).await.is_err() && !stopping {
                        warn!("Result consumer went away; stopping");
                        stopping = true;
                        summary.cancelled = true;
                    }

                    if let Some(error) = halt {
                        error!(error = %error, "Stopping on first exception");
                        workers.shutdown().await;
                        sleepers.shutdown().await;
                        return Err(error);
                    }
                }

                Some(woken) = sleepers.join_next(), if !sleepers.is_empty() => {
                    if let Ok(item) = woken {
                        ready.push_back(item);
                    }
                }

                permit = self.pool.acquire(), if has_work => {
                    let Some(permit) = permit else {
                        warn!("Worker pool closed");
                        stopping = true;
                        continue;
                    };
                    let next = match ready.pop_front() {
                        Some(item) => Some(item),
                        None => {
                            let item = generator.next();
                            match &item {
                                Some(_) => self.tasks.record(TaskEvent::Queued),
                                None => exhausted = true,
                            }
                            item
                        }
                    };
                    if let Some(item) = next {
                        let identity = item.restart();
                        let executor = Arc::clone(&executor);
                        let handle = workers.spawn(async move {
                            let outcome = executor.attempt(item).await;
                            (outcome, permit)
                        });
                        in_flight.insert(handle.id(), identity);
                    }
                }
            }
        }

        summary.pool_size = self.pool.size();
        info!(
            completed = summary.items_completed,
            failed = summary.items_failed,
            results = summary.results_emitted,
            retries = summary.retries,
            cancelled = summary.cancelled,
            workers = summary.pool_size,
            "Execution finished"
        );
        Ok(summary)
    }

    /// Limits the pool supervisor measures against.
    ///
    /// Configured overrides win; otherwise the tightest tier limit among the
    /// job's models is used.
    fn throughput_limits(&self, job: &JobSpec) -> ThroughputLimits {
        let concurrency = &self.config.concurrency;
        let tiers: Vec<_> = job
            .models()
            .iter()
            .filter_map(|m| {
                self.config
                    .get_tier(m.inference_service(), None)
                    .map(|tier| tier.for_model(m.model_name()))
            })
            .collect();

        ThroughputLimits {
            tokens_per_minute: (*concurrency.tokens_per_minute())
                .or_else(|| tiers.iter().filter_map(|t| t.tpm).min()),
            requests_per_minute: (*concurrency.requests_per_minute())
                .or_else(|| tiers.iter().filter_map(|t| t.rpm.map(u64::from)).min()),
            growth_threshold: *concurrency.growth_threshold(),
            sample_interval: concurrency.sample_interval(),
            window: concurrency.usage_window(),
        }
    }
}
