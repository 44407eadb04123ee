//! Work-item plan command handler.

use super::load_config;
use colloquy::{ColloquyResult, CompletionPlan, JobFile};
use std::path::Path;

/// Print one line per work item.
pub fn plan_job(
    job_path: &Path,
    repetitions: Option<u32>,
    config_path: Option<&Path>,
) -> ColloquyResult<()> {
    let config = load_config(config_path)?;
    let job_file = JobFile::from_file(job_path)?;
    let n = repetitions
        .or(*job_file.repetitions())
        .unwrap_or(*config.run.repetitions());
    let job = job_file.to_offline_job();

    let mut items = 0usize;
    let work = colloquy::plan_work(&job, n, &config);
    let expected = work.expected_results();
    for item in work {
        let plan = match item.plan() {
            CompletionPlan::Iterated => "iterated".to_string(),
            CompletionPlan::NativeN {
                parameter_name,
                value,
            } => format!("{}={}", parameter_name, value),
        };
        println!("{}  {}", item, plan);
        items += 1;
    }

    println!(
        "{} work items, {} results, {} model calls",
        items,
        expected,
        items * job.survey().len()
    );
    Ok(())
}
