// Tests for job files and end-to-end runs through the scripted model.

use colloquy::{
    ColloquyConfig, CompletionPlan, JobFile, Results, RunOptions, plan_work, run_job,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const JOB: &str = r#"
repetitions = 3

[[agents]]
name = "night-nurse"
traits = { age = 41, shift = "night" }

[[agents]]
name = "day-nurse"
instruction = "You are a nurse answering a staff survey."

[[scenarios]]
name = "monday"
values = { day = "Monday" }

[[models]]
name = "echo"
service = "test"
script = ["good."]

[[survey.questions]]
name = "mood"
text = "How is your mood on {{day}}?"
options = ["Good", "Bad"]
"#;

#[test]
fn test_parse_job_file() -> anyhow::Result<()> {
    let job_file = JobFile::from_toml_str(JOB)?;
    assert_eq!(*job_file.repetitions(), Some(3));
    assert_eq!(job_file.agents().len(), 2);
    assert_eq!(job_file.agents()[0].traits()["age"], json!(41));
    assert_eq!(job_file.models()[0].service(), "test");
    assert_eq!(job_file.survey().len(), 1);

    let job = job_file.to_job()?;
    assert_eq!(job.base_interview_count(), 2);
    Ok(())
}

#[test]
fn test_missing_survey_is_rejected() {
    let err = JobFile::from_toml_str("[[agents]]\nname = \"a\"\n").unwrap_err();
    assert!(err.to_string().contains("Failed to parse job file"));
}

#[test]
fn test_plan_uses_native_batches() -> anyhow::Result<()> {
    let config = ColloquyConfig::bundled()?;
    let job = JobFile::from_toml_str(JOB)?.to_offline_job();

    let plan: Vec<(usize, u32)> = plan_work(&job, 20, &config)
        .map(|item| (item.original_index(), item.plan().completions()))
        .collect();
    assert_eq!(plan, vec![(0, 16), (16, 4), (20, 16), (36, 4)]);

    let first = plan_work(&job, 20, &config).next().unwrap();
    assert!(matches!(
        first.plan(),
        CompletionPlan::NativeN { parameter_name, value: 16 } if parameter_name == "n"
    ));
    Ok(())
}

#[tokio::test]
async fn test_run_job_writes_ordered_results() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("results.json");
    let job_file = JobFile::from_toml_str(JOB)?;

    let options = RunOptions::default().with_output(Some(output.clone()));
    let results = run_job(
        &job_file,
        ColloquyConfig::bundled()?,
        &options,
        CancellationToken::new(),
    )
    .await?;

    assert_eq!(results.len(), 6);
    assert!(!results.is_partial());
    assert!(!results.has_failures());
    // "good." normalizes to the matching option
    assert_eq!(results.answers_for("mood"), vec![json!("Good"); 6]);

    let written: Results = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
    assert_eq!(written, results);
    Ok(())
}

#[tokio::test]
async fn test_cache_file_resumes_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = dir.path().join("cache.json");
    let job_file = JobFile::from_toml_str(JOB)?;
    let options = RunOptions::default()
        .with_repetitions(Some(2))
        .with_cache(Some(cache.clone()));

    let first = run_job(&job_file, ColloquyConfig::bundled()?, &options, CancellationToken::new()).await?;
    assert!(cache.exists());
    assert!(first.iter().all(|r| !*r.cached()));

    let second = run_job(&job_file, ColloquyConfig::bundled()?, &options, CancellationToken::new()).await?;
    assert_eq!(second.len(), 4);
    assert!(second.iter().all(|r| *r.cached()));
    assert_eq!(second.answers_for("mood"), first.answers_for("mood"));
    Ok(())
}

#[tokio::test]
async fn test_cancelled_run_is_partial() -> anyhow::Result<()> {
    let job_file = JobFile::from_toml_str(JOB)?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = run_job(&job_file, ColloquyConfig::bundled()?, &RunOptions::default(), cancel).await?;
    assert!(results.is_partial());
    assert!(*results.interrupted());
    Ok(())
}
