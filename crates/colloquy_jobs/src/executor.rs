//! One attempt at one work item.

use crate::{
    CompletedItem, CompletionPlan, Exchange, ExceptionRecord, FailureKind, FailureMarker,
    Interview, InterviewResult, JobSpec, NParameterHandler, TaskEvent, TaskTracker, WorkItem,
};
use colloquy_core::{
    CacheKey, CachedResponse, CompletionRequest, ModelResponse, NativeCompletions, Question,
    UsageRecord,
};
use colloquy_error::{
    ColloquyError, ColloquyResult, JobError, JobErrorKind, ModelError, ModelErrorKind,
    RetryableError,
};
use colloquy_interface::{AnswerValidator, LanguageModel};
use colloquy_rate_limit::{BackoffPolicy, ColloquyConfig, RateLimiter, TierConfig, UsageTracker};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// What became of an attempt.
pub(crate) enum AttemptOutcome {
    /// The item reached a final outcome, successful or not
    Finished(CompletedItem),
    /// The item should be tried again after `delay`
    Retry { item: WorkItem, delay: Duration },
}

/// Shared, immutable machinery every worker uses.
pub(crate) struct InterviewExecutor {
    handler: Arc<NParameterHandler>,
    validator: Arc<dyn AnswerValidator>,
    limiters: HashMap<(String, String), RateLimiter<TierConfig>>,
    usage: UsageTracker,
    tasks: TaskTracker,
    policy: BackoffPolicy,
    call_timeout: Duration,
}

impl InterviewExecutor {
    pub(crate) fn new(
        config: &ColloquyConfig,
        job: &JobSpec,
        handler: Arc<NParameterHandler>,
        validator: Arc<dyn AnswerValidator>,
        usage: UsageTracker,
        tasks: TaskTracker,
    ) -> Self {
        let mut limiters = HashMap::new();
        for model in job.models() {
            let key = (
                model.inference_service().to_string(),
                model.model_name().to_string(),
            );
            limiters.entry(key).or_insert_with(|| {
                let tier = config
                    .get_tier(model.inference_service(), None)
                    .map(|tier| tier.for_model(model.model_name()))
                    .unwrap_or_else(TierConfig::unlimited);
                debug!(
                    service = model.inference_service(),
                    model = model.model_name(),
                    tier = %tier.name,
                    "Rate limiter configured"
                );
                RateLimiter::new(tier)
            });
        }

        Self {
            handler,
            validator,
            limiters,
            usage,
            tasks,
            policy: BackoffPolicy::from(&config.retry),
            call_timeout: config.run.call_timeout(),
        }
    }

    /// Run the item's remaining questions.
    ///
    /// Questions already in the transcript from an earlier attempt are not
    /// asked again.
    #[instrument(skip_all, fields(item = %item, attempt = item.attempts() + 1))]
    pub(crate) async fn attempt(&self, mut item: WorkItem) -> AttemptOutcome {
        item.begin_attempt();
        self.tasks.record(TaskEvent::Started);

        match self.ask_remaining(&mut item).await {
            Ok(()) => {
                let completed = assemble(item);
                self.tasks.record(TaskEvent::Completed {
                    results: completed.results().len(),
                });
                AttemptOutcome::Finished(completed)
            }
            Err(error) => self.handle_failure(item, error),
        }
    }

    async fn ask_remaining(&self, item: &mut WorkItem) -> ColloquyResult<()> {
        let interview = item.interview().clone();
        let model = Arc::clone(interview.model());
        let service = model.inference_service().to_string();
        let survey = Arc::clone(interview.survey());
        let completions = item.plan().completions() as usize;
        let answered = item.state().transcript().len();

        for question in survey.questions.iter().skip(answered) {
            let request = build_request(&interview, question, item.plan());
            let key = CacheKey::for_request(&service, &request, item.iteration());
            let cache = item.state().cache().cloned();

            let hit = match &cache {
                Some(cache) => match cache.fetch(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cache lookup failed; calling model");
                        None
                    }
                },
                None => None,
            };

            let (entry, cached) = match hit {
                Some(entry) => {
                    debug!(key = %key, question = %question.name, "Cache hit");
                    self.usage
                        .record(UsageRecord::cached(now(), entry.response.usage));
                    (entry, true)
                }
                None => {
                    let response = self.call(model.as_ref(), &request).await?;
                    self.usage.record(UsageRecord::live(now(), response.usage));
                    let entry = CachedResponse::new(response);
                    if let Some(cache) = &cache
                        && let Err(e) = cache.store(key.clone(), entry.clone()).await
                    {
                        warn!(key = %key, error = %e, "Failed to store response in cache");
                    }
                    (entry, false)
                }
            };

            let texts = self
                .handler
                .extract_multiple_completions(&entry.response.raw, completions);
            let answers = texts
                .iter()
                .map(|raw| self.validator.validate(question, raw))
                .collect();

            let state = item.state_mut();
            state.note_cache_entry(key, entry);
            state.push_exchange(Exchange {
                question: question.name.clone(),
                completions: texts,
                answers,
                cached,
            });
        }

        Ok(())
    }

    async fn call(
        &self,
        model: &dyn LanguageModel,
        request: &CompletionRequest,
    ) -> ColloquyResult<ModelResponse> {
        let limiter = self.limiters.get(&(
            model.inference_service().to_string(),
            model.model_name().to_string(),
        ));
        let _guard = match limiter {
            Some(limiter) => Some(limiter.acquire(request.estimated_tokens()).await),
            None => None,
        };

        match tokio::time::timeout(self.call_timeout, model.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::new(ModelErrorKind::Timeout(self.call_timeout.as_secs())).into()),
        }
    }

    fn handle_failure(&self, item: WorkItem, error: ColloquyError) -> AttemptOutcome {
        if error.is_retryable() {
            if self.policy.allows(item.attempts()) {
                let delay = self.policy.delay(item.attempts(), error.retry_after());
                warn!(
                    item = %item,
                    attempts = item.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    rate_limited = error.is_rate_limit(),
                    error = %error,
                    "Retryable failure; re-enqueueing"
                );
                self.tasks.record(TaskEvent::Retried);
                return AttemptOutcome::Retry { item, delay };
            }

            error!(item = %item, attempts = item.attempts(), error = %error, "Giving up");
            let gave_up = JobError::new(JobErrorKind::GaveUp {
                original_index: item.original_index(),
                attempts: item.attempts(),
                last_error: error.to_string(),
            });
            return AttemptOutcome::Finished(failed(
                item,
                FailureKind::GaveUp,
                gave_up.into(),
                &self.tasks,
            ));
        }

        error!(item = %item, error = %error, "Non-retryable failure");
        AttemptOutcome::Finished(failed(item, FailureKind::Fatal, error, &self.tasks))
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

fn build_request(interview: &Interview, question: &Question, plan: &CompletionPlan) -> CompletionRequest {
    let model = interview.model();
    let completions = match plan {
        CompletionPlan::Iterated => None,
        CompletionPlan::NativeN {
            parameter_name,
            value,
        } => Some(NativeCompletions {
            parameter_name: parameter_name.clone(),
            count: *value,
        }),
    };

    CompletionRequest {
        model: model.model_name().to_string(),
        system_prompt: interview.agent().persona(),
        user_prompt: question.prompt_text(&interview.scenario().render(&question.text)),
        parameters: model.parameters(),
        completions,
    }
}

/// Turn a finished transcript into one result per planned completion.
fn assemble(item: WorkItem) -> CompletedItem {
    let interview = item.interview();
    let model = interview.model_ref();
    let transcript = item.state().transcript();
    let cached = !transcript.is_empty() && transcript.iter().all(|e| e.cached);
    let completions = item.plan().completions() as usize;

    let mut results = Vec::with_capacity(completions);
    let mut exceptions = Vec::new();
    let mut first_error: Option<ColloquyError> = None;

    for j in 0..completions {
        let order = item.original_index() + j;
        let iteration = item.iteration() + j as u32;
        let mut answers = BTreeMap::new();
        let mut raw_responses = BTreeMap::new();
        let mut failures = Vec::new();

        for exchange in transcript {
            let raw = exchange.completions.get(j).cloned().unwrap_or_default();
            let answer = match exchange.answers.get(j) {
                Some(Ok(value)) => value.clone(),
                Some(Err(invalid)) => {
                    failures.push(FailureMarker::new(
                        Some(exchange.question.clone()),
                        FailureKind::Validation,
                        invalid.message.clone(),
                    ));
                    exceptions.push(ExceptionRecord::new(
                        order,
                        iteration,
                        interview.agent().name(),
                        interview.scenario().name(),
                        model.clone(),
                        Some(exchange.question.clone()),
                        FailureKind::Validation,
                        invalid.message.clone(),
                        item.attempts(),
                    ));
                    if first_error.is_none() {
                        first_error = Some(invalid.clone().into());
                    }
                    JsonValue::Null
                }
                None => JsonValue::Null,
            };
            answers.insert(exchange.question.clone(), answer);
            raw_responses.insert(exchange.question.clone(), raw);
        }

        results.push(InterviewResult::new(
            order,
            iteration,
            Arc::clone(interview.agent()),
            Arc::clone(interview.scenario()),
            model.clone(),
            answers,
            raw_responses,
            failures,
            cached,
        ));
    }

    CompletedItem::new(item, results, exceptions, first_error)
}

/// Placeholders for every index of an item that produced no answers.
pub(crate) fn failed(
    item: WorkItem,
    kind: FailureKind,
    error: ColloquyError,
    tasks: &TaskTracker,
) -> CompletedItem {
    let interview = item.interview();
    let model = interview.model_ref();
    let message = error.to_string();

    let (results, exceptions): (Vec<_>, Vec<_>) = item
        .indices()
        .enumerate()
        .map(|(j, order)| {
            let iteration = item.iteration() + j as u32;
            let result = InterviewResult::placeholder(
                order,
                iteration,
                Arc::clone(interview.agent()),
                Arc::clone(interview.scenario()),
                model.clone(),
                FailureMarker::new(None, kind, message.clone()),
            );
            let exception = ExceptionRecord::new(
                order,
                iteration,
                interview.agent().name(),
                interview.scenario().name(),
                model.clone(),
                None,
                kind,
                message.clone(),
                item.attempts(),
            );
            (result, exception)
        })
        .unzip();

    tasks.record(TaskEvent::Failed {
        results: results.len(),
    });
    CompletedItem::new(item, results, exceptions, Some(error))
}
