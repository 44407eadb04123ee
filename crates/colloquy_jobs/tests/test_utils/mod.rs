//! Test utilities for job execution tests.
//!
//! This module provides a mock model, an in-memory cache and a recording
//! progress observer.

#![allow(dead_code)]

use async_trait::async_trait;
use colloquy_core::{
    Agent, CacheKey, CachedResponse, CompletionRequest, ModelNSupport, ModelResponse, Question,
    Survey, TokenUsage,
};
use colloquy_error::{ColloquyResult, ModelError, ModelErrorKind};
use colloquy_interface::{LanguageModel, ResponseCache};
use colloquy_jobs::{
    InterviewResult, JobSpec, NParameterHandler, ProgressObserver, Results, TrackerSnapshot,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Behavior configuration for mock responses.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always return success with the given text
    Success(String),
    /// Always return the specified error
    Error(ModelErrorKind),
    /// Fail N times with the error, then succeed with the text
    FailThenSucceed {
        fail_count: usize,
        error: ModelErrorKind,
        success_text: String,
    },
    /// Return a sequence of responses, then fail once it runs out
    Sequence(Vec<MockResponse>),
}

/// A single mock response (success or error).
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(String),
    Error(ModelErrorKind),
}

/// Mock model for engine tests.
///
/// Answers in the chat-completions shape with one choice per requested
/// completion, minus `short_by`.
pub struct MockModel {
    behavior: MockBehavior,
    service: String,
    name: String,
    calls: AtomicUsize,
    requested: Mutex<Vec<u32>>,
    max_delay_ms: u64,
    short_by: usize,
}

impl MockModel {
    /// A mock under the `mock` service that always answers `text`.
    pub fn new_success(text: impl Into<String>) -> Self {
        Self::new_with_behavior(MockBehavior::Success(text.into()))
    }

    /// A mock that always fails with `error`.
    pub fn new_error(error: ModelErrorKind) -> Self {
        Self::new_with_behavior(MockBehavior::Error(error))
    }

    /// A mock that fails `fail_count` times, then succeeds.
    pub fn new_fail_then_succeed(
        fail_count: usize,
        error: ModelErrorKind,
        success_text: impl Into<String>,
    ) -> Self {
        Self::new_with_behavior(MockBehavior::FailThenSucceed {
            fail_count,
            error,
            success_text: success_text.into(),
        })
    }

    /// A mock answering from a fixed sequence.
    pub fn new_sequence(responses: Vec<MockResponse>) -> Self {
        Self::new_with_behavior(MockBehavior::Sequence(responses))
    }

    /// A mock with custom behavior.
    pub fn new_with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            service: "mock".to_string(),
            name: "mock-model".to_string(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            max_delay_ms: 0,
            short_by: 0,
        }
    }

    /// Report a different inference service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Report a different model name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep a deterministic, call-dependent time below `max` before answering.
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Return `short_by` fewer completions than requested.
    pub fn with_short_responses(mut self, short_by: usize) -> Self {
        self.short_by = short_by;
        self
    }

    /// Number of times `complete` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Completion counts requested, in call order.
    pub fn requested_counts(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }

    fn respond(&self, call: usize, count: u32) -> ColloquyResult<ModelResponse> {
        let text = match &self.behavior {
            MockBehavior::Success(text) => text.clone(),
            MockBehavior::Error(error) => return Err(ModelError::new(error.clone()).into()),
            MockBehavior::FailThenSucceed {
                fail_count,
                error,
                success_text,
            } => {
                if call < *fail_count {
                    return Err(ModelError::new(error.clone()).into());
                }
                success_text.clone()
            }
            MockBehavior::Sequence(responses) => match responses.get(call) {
                Some(MockResponse::Success(text)) => text.clone(),
                Some(MockResponse::Error(error)) => {
                    return Err(ModelError::new(error.clone()).into());
                }
                None => {
                    return Err(ModelError::new(ModelErrorKind::MalformedResponse(format!(
                        "Mock sequence exhausted (call {} beyond {} responses)",
                        call + 1,
                        responses.len()
                    )))
                    .into());
                }
            },
        };

        let returned = (count as usize).saturating_sub(self.short_by);
        let choices: Vec<_> = (0..returned)
            .map(|_| json!({ "message": { "role": "assistant", "content": text } }))
            .collect();
        Ok(ModelResponse::new(
            json!({ "choices": choices }),
            TokenUsage::new(20, 5 * u64::from(count)),
        ))
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, request: &CompletionRequest) -> ColloquyResult<ModelResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push(request.completion_count());

        let delay_ms = if self.max_delay_ms > 0 {
            (call as u64 * 7919 + 13) % self.max_delay_ms
        } else {
            1
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        self.respond(call, request.completion_count())
    }

    fn inference_service(&self) -> &str {
        &self.service
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Response cache kept in a plain map.
#[derive(Default)]
pub struct MapCache {
    entries: Mutex<HashMap<CacheKey, CachedResponse>>,
}

impl MapCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseCache for MapCache {
    async fn fetch(&self, key: &CacheKey) -> ColloquyResult<Option<CachedResponse>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn store(&self, key: CacheKey, entry: CachedResponse) -> ColloquyResult<()> {
        self.entries.lock().unwrap().insert(key, entry);
        Ok(())
    }
}

/// Observer that records what it was told and can cancel after a number of results.
#[derive(Default)]
pub struct RecordingObserver {
    pub progress_ticks: AtomicUsize,
    pub results_seen: Mutex<Vec<usize>>,
    pub finished_with: Mutex<Option<usize>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingObserver {
    /// Cancel `token` once `count` results have been seen.
    pub fn cancelling_after(count: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((count, token)),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<usize> {
        self.results_seen.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, _snapshot: &TrackerSnapshot) {
        self.progress_ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_result(&self, result: &InterviewResult) {
        let mut seen = self.results_seen.lock().unwrap();
        seen.push(*result.order());
        if let Some((count, token)) = &self.cancel_after
            && seen.len() >= *count
        {
            token.cancel();
        }
    }

    fn on_finish(&self, results: &Results) {
        *self.finished_with.lock().unwrap() = Some(results.len());
    }
}

/// Native-N table with the mock service supporting `n` up to `max`.
pub fn native_handler(max: u32) -> NParameterHandler {
    NParameterHandler::default().with_provider("mock", ModelNSupport::native("n", max))
}

/// One free-text question.
pub fn one_question() -> Survey {
    Survey::new(vec![Question::free_text("feeling", "How do you feel?")])
}

/// A job with `agents` agents, one model and `survey`.
pub fn job_with(agents: usize, model: Arc<dyn LanguageModel>, survey: Survey) -> JobSpec {
    JobSpec::new(survey)
        .with_agents((0..agents).map(|i| Agent::new(format!("agent-{}", i))))
        .with_model(model)
}
