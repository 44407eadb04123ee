//! Entry points that run a job end to end.

use crate::{
    CompletedItem, EngineSummary, ExecutionEngine, InterviewGenerator, InterviewResult, JobSpec,
    NParameterHandler, ProgressObserver, ResultCollector, Results, TrackerSnapshot,
};
use colloquy_error::{ColloquyResult, JobError, JobErrorKind};
use colloquy_interface::{AnswerValidator, DefaultValidator, ResponseCache};
use colloquy_rate_limit::ColloquyConfig;
use futures_util::Stream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs jobs with a fixed configuration and set of collaborators.
///
/// Cancelling the runner's token stops every run it started: running items
/// finish, nothing new starts and the run returns partial results.
#[derive(Clone)]
pub struct JobRunner {
    config: ColloquyConfig,
    handler: Arc<NParameterHandler>,
    cache: Option<Arc<dyn ResponseCache>>,
    validator: Arc<dyn AnswerValidator>,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("handler", &self.handler)
            .field("has_cache", &self.cache.is_some())
            .field("has_observer", &self.observer.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl JobRunner {
    /// Runner using `config` for limits, retries and the native-N table.
    pub fn new(config: ColloquyConfig) -> Self {
        let handler = Arc::new(NParameterHandler::from_config(&config));
        Self {
            config,
            handler,
            cache: None,
            validator: Arc::new(DefaultValidator),
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Consult and fill `cache` around every model call.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parse answers with `validator`.
    pub fn with_validator(mut self, validator: Arc<dyn AnswerValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Report progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Stop when `cancel` is cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the native-N capability table.
    pub fn with_n_handler(mut self, handler: NParameterHandler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Token that cancels this runner's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The configuration in use.
    pub fn config(&self) -> &ColloquyConfig {
        &self.config
    }

    /// Run `job` with `n` repetitions and wait for every result.
    ///
    /// A cancelled run returns the results captured so far, marked
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Fails before starting on an empty job or `n == 0`. With
    /// `stop_on_exception` set, returns the first item error. A duplicate
    /// result index aborts the run.
    pub async fn run(&self, job: &JobSpec, n: u32) -> ColloquyResult<Results> {
        let mut active = self.start(job, n)?;
        while let Some(step) = active.step().await {
            step?;
        }
        active.finish().await
    }

    /// Run `job` with `n` repetitions, yielding `(result, original_index)`
    /// as each result is captured.
    ///
    /// Results arrive in completion order. The stream ends after the last
    /// result, or with an error under the same conditions as
    /// [`run`](Self::run).
    pub fn stream(
        &self,
        job: JobSpec,
        n: u32,
    ) -> impl Stream<Item = ColloquyResult<(InterviewResult, usize)>> + Send + use<> {
        let runner = self.clone();
        async_stream::try_stream! {
            let mut active = runner.start(&job, n)?;
            while let Some(step) = active.step().await {
                for index in step? {
                    if let Some(result) = active.collector.get(index) {
                        yield (result.clone(), index);
                    }
                }
            }
            active.finish().await?;
        }
    }

    fn start(&self, job: &JobSpec, n: u32) -> ColloquyResult<ActiveRun> {
        if n == 0 {
            return Err(JobError::new(JobErrorKind::InvalidRepetitions(n)).into());
        }
        job.validate()?;

        let generator =
            InterviewGenerator::new(job.clone(), n, Arc::clone(&self.handler), self.cache.clone());
        let expected = generator.expected_results();
        let mut collector = ResultCollector::new(expected);
        if let Some(size) = *self.config.collector.release_batch_size() {
            collector = collector.with_batch_size(size);
        }

        let run_cancel = self.cancel.child_token();
        let engine = Arc::new(ExecutionEngine::new(
            self.config.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.validator),
            run_cancel.clone(),
        ));

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            job = ?job,
            n,
            expected,
            release_batch = collector.batch_size(),
            "Starting job"
        );

        let (sink, rx) = mpsc::channel(engine.pool().max_workers().max(1) * 2);
        let engine_task = tokio::spawn({
            let engine = Arc::clone(&engine);
            let job = job.clone();
            async move { engine.execute(&job, generator, sink).await }
        });

        let progress_interval = self.config.concurrency.progress_interval();
        let mut ticker = tokio::time::interval(progress_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        Ok(ActiveRun {
            engine,
            engine_task,
            rx,
            collector,
            observer: self.observer.clone(),
            ticker,
            usage_window: self.config.concurrency.usage_window(),
            run_id,
            run_cancel,
            user_cancel: self.cancel.clone(),
            started: Instant::now(),
        })
    }
}

/// A started run: the engine task and the collector draining it.
struct ActiveRun {
    engine: Arc<ExecutionEngine>,
    engine_task: JoinHandle<ColloquyResult<EngineSummary>>,
    rx: mpsc::Receiver<CompletedItem>,
    collector: ResultCollector,
    observer: Option<Arc<dyn ProgressObserver>>,
    ticker: tokio::time::Interval,
    usage_window: Duration,
    run_id: Uuid,
    run_cancel: CancellationToken,
    user_cancel: CancellationToken,
    started: Instant,
}

impl ActiveRun {
    /// Capture the next completed item, reporting progress while waiting.
    ///
    /// Returns `None` once the engine has sent everything.
    async fn step(&mut self) -> Option<ColloquyResult<Vec<usize>>> {
        loop {
            tokio::select! {
                biased;

                completed = self.rx.recv() => {
                    let completed = completed?;
                    return Some(self.capture(completed));
                }

                _ = self.ticker.tick() => self.report(),
            }
        }
    }

    fn capture(&mut self, completed: CompletedItem) -> ColloquyResult<Vec<usize>> {
        match self.collector.capture(completed) {
            Ok(indices) => {
                if let Some(observer) = &self.observer {
                    for index in &indices {
                        if let Some(result) = self.collector.get(*index) {
                            observer.on_result(result);
                        }
                    }
                }
                Ok(indices)
            }
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Aborting run");
                self.run_cancel.cancel();
                self.engine_task.abort();
                Err(e)
            }
        }
    }

    fn report(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        let usage = self.engine.usage();
        let snapshot = TrackerSnapshot::new(
            self.engine.tasks().snapshot(),
            usage.usage_rates(self.usage_window),
            usage.totals(),
            self.engine.pool().size(),
            self.collector.expected(),
            self.collector.len(),
            self.started.elapsed(),
        );
        observer.on_progress(&snapshot);
    }

    async fn finish(mut self) -> ColloquyResult<Results> {
        let summary = match (&mut self.engine_task).await {
            Ok(outcome) => outcome?,
            Err(e) => {
                return Err(JobError::new(JobErrorKind::WorkerPanicked(e.to_string())).into());
            }
        };
        debug!(run_id = %self.run_id, summary = ?summary, "Engine finished");

        self.engine.tasks().flush().await;
        self.engine.usage().flush().await;
        self.report();

        let interrupted = *summary.cancelled() || self.user_cancel.is_cancelled();
        let results = self.collector.finish(interrupted);
        if let Some(observer) = &self.observer {
            observer.on_finish(&results);
        }
        if interrupted {
            warn!(
                run_id = %self.run_id,
                captured = results.len(),
                expected = results.expected(),
                "Run interrupted; returning partial results"
            );
        }
        Ok(results)
    }
}

/// Run `job` once with `config` and default collaborators.
///
/// # Errors
///
/// See [`JobRunner::run`].
pub async fn run(
    job: &JobSpec,
    n: u32,
    config: &ColloquyConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
) -> ColloquyResult<Results> {
    let mut runner = JobRunner::new(config.clone());
    if let Some(observer) = observer {
        runner = runner.with_observer(observer);
    }
    runner.run(job, n).await
}

/// Stream the results of `job` with `config` and default collaborators.
pub fn stream(
    job: JobSpec,
    n: u32,
    config: &ColloquyConfig,
) -> impl Stream<Item = ColloquyResult<(InterviewResult, usize)>> + Send + use<> {
    JobRunner::new(config.clone()).stream(job, n)
}
