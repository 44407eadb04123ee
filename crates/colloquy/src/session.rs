//! Running and planning job files end to end.

use crate::JobFile;
use colloquy_cache::{InMemoryResponseCache, ResponseCacheConfig};
use colloquy_error::{ColloquyResult, ConfigError};
use colloquy_jobs::{
    InterviewGenerator, JobRunner, JobSpec, LoggingProgressObserver, NParameterHandler, Results,
};
use colloquy_rate_limit::ColloquyConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// How to run a job file.
#[derive(Debug, Clone, Default, derive_getters::Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct RunOptions {
    /// Repetitions; falls back to the job file, then `[run] repetitions`
    repetitions: Option<u32>,
    /// Fixed worker count, disabling pool growth
    concurrency: Option<usize>,
    /// Abort on the first item error
    stop_on_exception: bool,
    /// Where to write the results as JSON
    output: Option<PathBuf>,
    /// Response cache file, read before and written after the run
    cache: Option<PathBuf>,
}

/// Apply command-line overrides to the loaded configuration.
fn configure(mut config: ColloquyConfig, options: &RunOptions) -> ColloquyConfig {
    if let Some(workers) = options.concurrency {
        let workers = workers.max(1);
        config.concurrency = config
            .concurrency
            .clone()
            .with_initial_workers(workers)
            .with_max_workers(workers);
    }
    if options.stop_on_exception {
        config.run = config.run.clone().with_stop_on_exception(true);
    }
    config
}

fn repetitions(job_file: &JobFile, config: &ColloquyConfig, options: &RunOptions) -> u32 {
    options
        .repetitions
        .or(*job_file.repetitions())
        .unwrap_or(*config.run.repetitions())
}

fn open_cache(path: &Path) -> ColloquyResult<InMemoryResponseCache> {
    if path.exists() {
        InMemoryResponseCache::load_json(ResponseCacheConfig::default(), path)
    } else {
        info!(path = %path.display(), "Starting a new response cache");
        Ok(InMemoryResponseCache::default())
    }
}

/// Run a job file.
///
/// Cancelling `cancel` stops the run cooperatively; the partial results are
/// still written.
///
/// # Errors
///
/// Returns an error if the job cannot be built, the run fails, or the output
/// cannot be written.
#[instrument(skip_all, fields(repetitions = ?options.repetitions))]
pub async fn run_job(
    job_file: &JobFile,
    config: ColloquyConfig,
    options: &RunOptions,
    cancel: CancellationToken,
) -> ColloquyResult<Results> {
    let config = configure(config, options);
    let n = repetitions(job_file, &config, options);
    let job = job_file.to_job()?;

    let cache = match &options.cache {
        Some(path) => Some(Arc::new(open_cache(path)?)),
        None => None,
    };

    let mut runner = JobRunner::new(config)
        .with_observer(Arc::new(LoggingProgressObserver))
        .with_cancellation(cancel);
    if let Some(cache) = &cache {
        runner = runner.with_cache(cache.clone());
    }

    let results = runner.run(&job, n).await?;

    if let (Some(cache), Some(path)) = (&cache, &options.cache)
        && let Err(e) = cache.save_json(path)
    {
        warn!(error = %e, "Failed to save response cache");
    }

    if let Some(path) = &options.output {
        write_results(&results, path)?;
    }

    if results.task_history().has_exceptions() {
        info!("{}", results.task_history().summary());
    }
    Ok(results)
}

fn write_results(results: &Results, path: &Path) -> ColloquyResult<()> {
    let text = serde_json::to_string_pretty(results)
        .map_err(|e| ConfigError::new(format!("Failed to serialize results: {}", e)))?;
    std::fs::write(path, text).map_err(|e| {
        ConfigError::new(format!(
            "Failed to write results to {}: {}",
            path.display(),
            e
        ))
    })?;
    info!(path = %path.display(), results = results.len(), "Results written");
    Ok(())
}

/// The work items a run of `job` would execute, without calling any model.
pub fn plan_work(job: &JobSpec, n: u32, config: &ColloquyConfig) -> InterviewGenerator {
    InterviewGenerator::new(
        job.clone(),
        n,
        Arc::new(NParameterHandler::from_config(config)),
        None,
    )
}
