//! Ordered results and the run's task history.

use crate::ModelRef;
use chrono::{DateTime, Utc};
use colloquy_core::{Agent, CacheKey, CachedResponse, Scenario};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Why a result, or one of its answers, is missing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The answer could not be interpreted
    Validation,
    /// Retries were exhausted on a rate-limit-class failure
    GaveUp,
    /// A non-retryable model or configuration failure
    Fatal,
    /// The worker running the item crashed
    Crashed,
}

/// Failure attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct FailureMarker {
    question: Option<String>,
    kind: FailureKind,
    message: String,
}

impl FailureMarker {
    /// Create a marker; `question` is `None` when the whole result failed.
    pub fn new(question: Option<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            question,
            kind,
            message: message.into(),
        }
    }
}

/// One logical repetition of one base interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct InterviewResult {
    order: usize,
    iteration: u32,
    agent: Arc<Agent>,
    scenario: Arc<Scenario>,
    model: ModelRef,
    answers: BTreeMap<String, JsonValue>,
    raw_responses: BTreeMap<String, String>,
    failures: Vec<FailureMarker>,
    cached: bool,
}

impl InterviewResult {
    /// Assemble a result.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order: usize,
        iteration: u32,
        agent: Arc<Agent>,
        scenario: Arc<Scenario>,
        model: ModelRef,
        answers: BTreeMap<String, JsonValue>,
        raw_responses: BTreeMap<String, String>,
        failures: Vec<FailureMarker>,
        cached: bool,
    ) -> Self {
        Self {
            order,
            iteration,
            agent,
            scenario,
            model,
            answers,
            raw_responses,
            failures,
            cached,
        }
    }

    /// A result standing in for an item that produced no answers.
    pub fn placeholder(
        order: usize,
        iteration: u32,
        agent: Arc<Agent>,
        scenario: Arc<Scenario>,
        model: ModelRef,
        failure: FailureMarker,
    ) -> Self {
        Self::new(
            order,
            iteration,
            agent,
            scenario,
            model,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![failure],
            false,
        )
    }

    /// Answer to one question.
    pub fn answer(&self, question: &str) -> Option<&JsonValue> {
        self.answers.get(question)
    }

    /// Whether any failure is attached.
    pub fn is_failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Execution metadata of one captured work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct InterviewRecord {
    original_index: usize,
    iteration: u32,
    completions: u32,
    agent: String,
    scenario: String,
    model: ModelRef,
    attempts: u32,
    cache_entries: usize,
    exceptions: usize,
    released: bool,
    captured_at: DateTime<Utc>,
}

impl InterviewRecord {
    /// Record a captured work item.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        original_index: usize,
        iteration: u32,
        completions: u32,
        agent: impl Into<String>,
        scenario: impl Into<String>,
        model: ModelRef,
        attempts: u32,
        cache_entries: usize,
        exceptions: usize,
        released: bool,
    ) -> Self {
        Self {
            original_index,
            iteration,
            completions,
            agent: agent.into(),
            scenario: scenario.into(),
            model,
            attempts,
            cache_entries,
            exceptions,
            released,
            captured_at: Utc::now(),
        }
    }
}

/// A failure observed during the run, with enough context to find its item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct ExceptionRecord {
    original_index: usize,
    iteration: u32,
    agent: String,
    scenario: String,
    model: ModelRef,
    question: Option<String>,
    kind: FailureKind,
    message: String,
    attempt: u32,
    timestamp: DateTime<Utc>,
}

impl ExceptionRecord {
    /// Record a failure now.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        original_index: usize,
        iteration: u32,
        agent: impl Into<String>,
        scenario: impl Into<String>,
        model: ModelRef,
        question: Option<String>,
        kind: FailureKind,
        message: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            original_index,
            iteration,
            agent: agent.into(),
            scenario: scenario.into(),
            model,
            question,
            kind,
            message: message.into(),
            attempt,
            timestamp: Utc::now(),
        }
    }
}

/// Everything that happened to the run's work items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct TaskHistory {
    interviews: Vec<InterviewRecord>,
    exceptions: Vec<ExceptionRecord>,
}

impl TaskHistory {
    /// Append a captured item.
    pub fn record_interview(&mut self, record: InterviewRecord) {
        self.interviews.push(record);
    }

    /// Append failures.
    pub fn record_exceptions(&mut self, records: impl IntoIterator<Item = ExceptionRecord>) {
        self.exceptions.extend(records);
    }

    /// Whether any failure was recorded.
    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// Failures of one kind.
    pub fn failures(&self, kind: FailureKind) -> impl Iterator<Item = &ExceptionRecord> {
        self.exceptions.iter().filter(move |e| e.kind == kind)
    }

    /// Failures touching the item at `original_index`.
    pub fn exceptions_for(&self, original_index: usize) -> impl Iterator<Item = &ExceptionRecord> {
        self.exceptions
            .iter()
            .filter(move |e| e.original_index == original_index)
    }

    /// Failures at any index in `indices`, such as every result of one
    /// native-N item.
    pub fn exceptions_within(
        &self,
        indices: std::ops::Range<usize>,
    ) -> impl Iterator<Item = &ExceptionRecord> {
        self.exceptions
            .iter()
            .filter(move |e| indices.contains(&e.original_index))
    }

    /// One line per failure kind, for terminal output.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for exception in &self.exceptions {
            *counts.entry(exception.kind.to_string()).or_default() += 1;
        }
        let mut lines = vec![format!(
            "{} work items captured, {} exceptions",
            self.interviews.len(),
            self.exceptions.len()
        )];
        lines.extend(
            counts
                .into_iter()
                .map(|(kind, count)| format!("  {}: {}", kind, count)),
        );
        lines.join("\n")
    }
}

/// Results of a run in original-index order.
///
/// A run that was cancelled, or whose items failed, still produces a
/// container; [`is_partial`](Self::is_partial) and
/// [`has_failures`](Self::has_failures) tell the caller what is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Results {
    data: Vec<InterviewResult>,
    task_history: TaskHistory,
    cache: BTreeMap<CacheKey, CachedResponse>,
    interrupted: bool,
    expected: usize,
}

impl Results {
    /// Assemble a container; `data` must already be in index order.
    pub fn new(
        data: Vec<InterviewResult>,
        task_history: TaskHistory,
        cache: BTreeMap<CacheKey, CachedResponse>,
        interrupted: bool,
        expected: usize,
    ) -> Self {
        Self {
            data,
            task_history,
            cache,
            interrupted,
            expected,
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Results in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, InterviewResult> {
        self.data.iter()
    }

    /// Result with a given original index.
    pub fn get(&self, order: usize) -> Option<&InterviewResult> {
        self.data
            .binary_search_by_key(&order, |r| r.order)
            .ok()
            .map(|i| &self.data[i])
    }

    /// Whether the run stopped before every result was produced.
    pub fn is_partial(&self) -> bool {
        self.interrupted || self.data.len() < self.expected
    }

    /// Whether any result carries a failure or any exception was recorded.
    pub fn has_failures(&self) -> bool {
        self.task_history.has_exceptions() || self.data.iter().any(InterviewResult::is_failed)
    }

    /// Results carrying at least one failure.
    pub fn failed_results(&self) -> impl Iterator<Item = &InterviewResult> {
        self.data.iter().filter(|r| r.is_failed())
    }

    /// Answers to one question, `Null` where a result has none.
    pub fn answers_for(&self, question: &str) -> Vec<JsonValue> {
        self.data
            .iter()
            .map(|r| r.answer(question).cloned().unwrap_or(JsonValue::Null))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a InterviewResult;
    type IntoIter = std::slice::Iter<'a, InterviewResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl IntoIterator for Results {
    type Item = InterviewResult;
    type IntoIter = std::vec::IntoIter<InterviewResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(order: usize, answer: Option<JsonValue>) -> InterviewResult {
        let agent = Arc::new(Agent::new("a"));
        let scenario = Arc::new(Scenario::new("s"));
        let model = ModelRef::new("test", "m");
        match answer {
            Some(value) => {
                let mut answers = BTreeMap::new();
                answers.insert("q".to_string(), value);
                InterviewResult::new(order, 0, agent, scenario, model, answers, BTreeMap::new(), vec![], false)
            }
            None => InterviewResult::placeholder(
                order,
                0,
                agent,
                scenario,
                model,
                FailureMarker::new(None, FailureKind::GaveUp, "quota"),
            ),
        }
    }

    #[test]
    fn helpers_report_partial_and_failed_runs() {
        let results = Results::new(
            vec![result(0, Some(json!("yes"))), result(1, None), result(3, Some(json!("no")))],
            TaskHistory::default(),
            BTreeMap::new(),
            false,
            4,
        );

        assert_eq!(results.len(), 3);
        assert!(results.is_partial());
        assert!(results.has_failures());
        assert_eq!(results.failed_results().count(), 1);
        assert_eq!(results.answers_for("q"), vec![json!("yes"), JsonValue::Null, json!("no")]);
        assert_eq!(results.get(3).map(|r| *r.order()), Some(3));
        assert!(results.get(2).is_none());
    }

    #[test]
    fn results_serialize_to_json() {
        let results = Results::new(
            vec![result(0, Some(json!(1)))],
            TaskHistory::default(),
            BTreeMap::new(),
            false,
            1,
        );
        let text = serde_json::to_string(&results).unwrap();
        let back: Results = serde_json::from_str(&text).unwrap();
        assert_eq!(back, results);
        assert!(!back.is_partial());
    }

    #[test]
    fn summary_counts_by_kind() {
        let mut history = TaskHistory::default();
        let model = ModelRef::new("test", "m");
        history.record_exceptions([
            ExceptionRecord::new(0, 0, "a", "s", model.clone(), Some("q".into()), FailureKind::Validation, "empty answer", 1),
            ExceptionRecord::new(1, 1, "a", "s", model, None, FailureKind::GaveUp, "quota", 6),
        ]);
        let summary = history.summary();
        assert!(summary.contains("2 exceptions"));
        assert!(summary.contains("validation: 1"));
        assert!(summary.contains("gave_up: 1"));
        assert_eq!(history.failures(FailureKind::Validation).count(), 1);
        assert_eq!(history.exceptions_for(1).count(), 1);
    }
}
