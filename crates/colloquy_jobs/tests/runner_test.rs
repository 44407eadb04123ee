// End-to-end tests of job runs against mock models.

mod test_utils;

use colloquy_core::{Agent, ModelNSupport, Question, Scenario, Survey};
use colloquy_error::{ColloquyErrorKind, JobErrorKind, ModelErrorKind};
use colloquy_interface::LanguageModel;
use colloquy_jobs::{FailureKind, JobRunner, JobSpec, NParameterHandler};
use colloquy_rate_limit::ColloquyConfig;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    MapCache, MockModel, MockResponse, RecordingObserver, job_with, native_handler, one_question,
};

fn rate_limited() -> ModelErrorKind {
    ModelErrorKind::RateLimited {
        retry_after_ms: None,
        message: "quota exceeded".to_string(),
    }
}

fn config() -> ColloquyConfig {
    ColloquyConfig::default()
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_original_index_order() -> anyhow::Result<()> {
    let first: Arc<dyn LanguageModel> = Arc::new(
        MockModel::new_success("fine").with_name("first").with_jitter(Duration::from_millis(50)),
    );
    let second: Arc<dyn LanguageModel> = Arc::new(
        MockModel::new_success("fine").with_name("second").with_jitter(Duration::from_millis(37)),
    );
    let job = JobSpec::new(one_question())
        .with_agents((0..3).map(|i| Agent::new(format!("agent-{}", i))))
        .with_scenarios([Scenario::new("morning"), Scenario::new("evening")])
        .with_model(first)
        .with_model(second);

    let observer = Arc::new(RecordingObserver::default());
    let runner = JobRunner::new(config()).with_observer(observer.clone());
    let results = runner.run(&job, 4).await?;

    assert_eq!(results.len(), 3 * 2 * 2 * 4);
    assert!(!results.is_partial());
    assert!(!results.has_failures());
    let orders: Vec<usize> = results.iter().map(|r| *r.order()).collect();
    assert_eq!(orders, (0..48).collect::<Vec<_>>());

    // agents outermost, then scenarios, then models, then iterations
    let r = results.get(13).unwrap();
    assert_eq!(r.agent().name(), "agent-0");
    assert_eq!(r.scenario().name(), "evening");
    assert_eq!(r.model().name(), "second");
    assert_eq!(*r.iteration(), 1);

    // completion order differs from index order with jittered delays
    assert_ne!(observer.seen(), orders);
    assert_eq!(*observer.finished_with.lock().unwrap(), Some(48));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fallback_asks_once_per_repetition() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok").with_service("plain"));
    let job = job_with(2, mock.clone(), one_question());

    let runner = JobRunner::new(config()).with_n_handler(native_handler(128));
    let results = runner.run(&job, 3).await?;

    assert_eq!(results.len(), 6);
    assert_eq!(mock.call_count(), 6);
    assert!(mock.requested_counts().iter().all(|&n| n == 1));
    let iterations: Vec<u32> = results.iter().map(|r| *r.iteration()).collect();
    assert_eq!(iterations, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(results.get(4).unwrap().agent().name(), "agent-1");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_native_n_batches_cover_every_index() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok"));
    let job = job_with(1, mock.clone(), one_question());

    let runner = JobRunner::new(config()).with_n_handler(native_handler(128));
    let results = runner.run(&job, 200).await?;

    assert_eq!(results.len(), 200);
    let mut counts = mock.requested_counts();
    counts.sort_unstable();
    assert_eq!(counts, vec![72, 128]);
    let orders: Vec<usize> = results.iter().map(|r| *r.order()).collect();
    assert_eq!(orders, (0..200).collect::<Vec<_>>());
    let iterations: Vec<u32> = results.iter().map(|r| *r.iteration()).collect();
    assert_eq!(iterations, (0..200).collect::<Vec<_>>());
    assert_eq!(results.get(150).unwrap().answer("feeling"), Some(&json!("ok")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_short_native_response_is_padded() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok").with_short_responses(2));
    let job = job_with(1, mock, one_question());

    let runner = JobRunner::new(config()).with_n_handler(native_handler(8));
    let results = runner.run(&job, 4).await?;

    assert_eq!(results.len(), 4);
    assert_eq!(results.answers_for("feeling"), vec![json!("ok"), json!("ok"), json!(null), json!(null)]);
    let padded: Vec<usize> = results.failed_results().map(|r| *r.order()).collect();
    assert_eq!(padded, vec![2, 3]);
    assert_eq!(
        results.task_history().failures(FailureKind::Validation).count(),
        2
    );

    // the one native call owns both padded failures
    let records = results.task_history().interviews();
    assert_eq!(records.len(), 1);
    assert_eq!(*records[0].completions(), 4);
    assert_eq!(*records[0].exceptions(), 2);
    assert_eq!(results.task_history().exceptions_within(0..4).count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_retry_produces_exactly_one_result() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_fail_then_succeed(2, rate_limited(), "recovered"));
    let job = job_with(1, mock.clone(), one_question());

    let results = JobRunner::new(config()).run(&job, 1).await?;

    assert_eq!(results.len(), 1);
    assert_eq!(mock.call_count(), 3);
    assert_eq!(results.get(0).unwrap().answer("feeling"), Some(&json!("recovered")));
    assert!(!results.has_failures());
    let record = &results.task_history().interviews()[0];
    assert_eq!(*record.attempts(), 3);
    assert!(*record.released());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_retries() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_error(rate_limited()));
    let job = job_with(1, mock.clone(), one_question());

    let mut config = config();
    config.retry = config.retry.clone().with_max_retries(2);
    let results = JobRunner::new(config).run(&job, 1).await?;

    assert_eq!(mock.call_count(), 3);
    assert_eq!(results.len(), 1);
    let result = results.get(0).unwrap();
    assert_eq!(*result.failures()[0].kind(), FailureKind::GaveUp);
    assert!(result.answers().is_empty());
    assert_eq!(results.task_history().failures(FailureKind::GaveUp).count(), 1);
    assert!(!results.is_partial());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_error(ModelErrorKind::Http {
        status_code: 400,
        message: "bad request".to_string(),
    }));
    let job = job_with(2, mock.clone(), one_question());

    let results = JobRunner::new(config()).run(&job, 1).await?;

    assert_eq!(mock.call_count(), 2);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| *r.failures()[0].kind() == FailureKind::Fatal));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_on_exception_propagates_original_error() {
    let mock = Arc::new(MockModel::new_error(ModelErrorKind::Http {
        status_code: 400,
        message: "bad request".to_string(),
    }));
    let job = job_with(3, mock, one_question());

    let mut config = config();
    config.run = config.run.clone().with_stop_on_exception(true);
    let err = JobRunner::new(config).run(&job, 5).await.unwrap_err();

    match err.kind() {
        ColloquyErrorKind::Model(e) => assert_eq!(
            e.kind,
            ModelErrorKind::Http {
                status_code: 400,
                message: "bad request".to_string(),
            }
        ),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_validation_failures_are_marked_not_raised() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("purple"));
    let survey = Survey::new(vec![
        Question::free_text("feeling", "How do you feel?"),
        Question::multiple_choice("mood", "Good or bad?", vec!["Good".into(), "Bad".into()]),
    ]);
    let job = job_with(1, mock.clone(), survey);

    let results = JobRunner::new(config()).run(&job, 2).await?;

    assert_eq!(results.len(), 2);
    assert_eq!(mock.call_count(), 4);
    for result in &results {
        assert_eq!(result.answer("feeling"), Some(&json!("purple")));
        assert_eq!(result.answer("mood"), Some(&json!(null)));
        assert_eq!(result.failures().len(), 1);
        assert_eq!(result.failures()[0].question().as_deref(), Some("mood"));
    }
    assert_eq!(results.task_history().failures(FailureKind::Validation).count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_partial_results() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok").with_jitter(Duration::from_millis(20)));
    let job = job_with(1, mock, one_question());

    let mut config = config();
    config.concurrency = config
        .concurrency
        .clone()
        .with_initial_workers(4)
        .with_max_workers(4);
    let runner = JobRunner::new(config);
    let observer = Arc::new(RecordingObserver::cancelling_after(10, runner.cancellation_token()));
    let runner = runner.with_observer(observer.clone());

    let results = runner.run(&job, 100).await?;

    assert!(results.is_partial());
    assert!(*results.interrupted());
    assert!(results.len() >= 10, "captured {}", results.len());
    // only items holding one of the four worker slots can finish after the cancel
    assert!(results.len() <= 10 + 4, "captured {}", results.len());
    let orders: Vec<usize> = results.iter().map(|r| *r.order()).collect();
    let mut sorted = orders.clone();
    sorted.sort_unstable();
    assert_eq!(orders, sorted);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cache_serves_repeated_run() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok"));
    let job = job_with(2, mock.clone(), one_question());
    let cache = Arc::new(MapCache::default());
    let runner = JobRunner::new(config()).with_cache(cache.clone());

    let first = runner.run(&job, 2).await?;
    assert_eq!(mock.call_count(), 4);
    assert_eq!(cache.len(), 4);
    assert_eq!(first.cache().len(), 4);
    assert!(first.iter().all(|r| !*r.cached()));

    let second = runner.run(&job, 2).await?;
    assert_eq!(mock.call_count(), 4);
    assert!(second.iter().all(|r| *r.cached()));
    assert_eq!(second.answers_for("feeling"), first.answers_for("feeling"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_yields_every_index_once() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok").with_jitter(Duration::from_millis(30)));
    let job = job_with(3, mock, one_question());

    let runner = JobRunner::new(config()).with_n_handler(
        NParameterHandler::default().with_provider("mock", ModelNSupport::native("n", 2)),
    );
    let mut indices = Vec::new();
    let mut stream = std::pin::pin!(runner.stream(job, 5));
    while let Some(item) = stream.next().await {
        let (result, index) = item?;
        assert_eq!(*result.order(), index);
        indices.push(index);
    }

    indices.sort_unstable();
    assert_eq!(indices, (0..15).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stream_outlives_its_runner() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok"));
    let job = job_with(2, mock, one_question());

    // the stream owns everything it needs once created
    let stream = {
        let config = config();
        colloquy_jobs::stream(job, 2, &config)
    };
    let collected: Vec<_> = stream.collect().await;
    let mut indices = collected
        .into_iter()
        .map(|item| item.map(|(_, index)| index))
        .collect::<Result<Vec<_>, _>>()?;
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_jobs_fail_before_running() {
    let mock: Arc<dyn LanguageModel> = Arc::new(MockModel::new_success("ok"));
    let runner = JobRunner::new(config());

    let err = runner
        .run(&job_with(1, mock.clone(), one_question()), 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ColloquyErrorKind::Job(e) if e.kind == JobErrorKind::InvalidRepetitions(0)
    ));

    let err = runner
        .run(&JobSpec::new(one_question()).with_model(mock), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ColloquyErrorKind::Job(e) if matches!(e.kind, JobErrorKind::EmptyJob(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_and_server_errors_are_retried() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_sequence(vec![
        MockResponse::Error(ModelErrorKind::Timeout(120)),
        MockResponse::Error(ModelErrorKind::Http {
            status_code: 503,
            message: "overloaded".to_string(),
        }),
        MockResponse::Success("third time".to_string()),
    ]));
    let job = job_with(1, mock.clone(), one_question());

    let results = JobRunner::new(config()).run(&job, 1).await?;

    assert_eq!(mock.call_count(), 3);
    assert_eq!(results.get(0).unwrap().answer("feeling"), Some(&json!("third time")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported() -> anyhow::Result<()> {
    let mock = Arc::new(MockModel::new_success("ok").with_jitter(Duration::from_millis(500)));
    let job = job_with(2, mock, one_question());

    let observer = Arc::new(RecordingObserver::default());
    let mut config = config();
    config.concurrency = config
        .concurrency
        .clone()
        .with_initial_workers(1)
        .with_max_workers(1)
        .with_progress_interval_ms(100);
    let results = JobRunner::new(config)
        .with_observer(observer.clone())
        .run(&job, 5)
        .await?;

    assert_eq!(results.len(), 10);
    assert!(observer.progress_ticks.load(std::sync::atomic::Ordering::SeqCst) > 1);
    assert_eq!(observer.seen().len(), 10);
    Ok(())
}
