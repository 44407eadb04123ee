//! Job execution command handler.

use super::load_config;
use colloquy::{ColloquyResult, JobFile, RunOptions};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run a job file, cancelling cooperatively on Ctrl-C.
pub async fn run_job(
    job_path: &Path,
    config_path: Option<&Path>,
    options: RunOptions,
) -> ColloquyResult<()> {
    let config = load_config(config_path)?;
    let job_file = JobFile::from_file(job_path)?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; waiting for running interviews to finish");
                cancel.cancel();
            }
        }
    });

    let outcome = colloquy::run_job(&job_file, config, &options, cancel).await;
    interrupt.abort();
    let results = outcome?;

    let failed = results.failed_results().count();
    info!(
        results = results.len(),
        expected = results.expected(),
        failed,
        partial = results.is_partial(),
        "Run complete"
    );
    if options.output().is_none() {
        println!(
            "{} of {} results ({} with failures){}",
            results.len(),
            results.expected(),
            failed,
            if results.is_partial() { ", partial" } else { "" }
        );
    }
    Ok(())
}
