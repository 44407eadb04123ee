//! Work items and their mutable execution state.

use crate::Interview;
use colloquy_core::{CacheKey, CachedResponse};
use colloquy_error::ValidationError;
use colloquy_interface::ResponseCache;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// How the repetitions of a work item are obtained.
///
/// Decided once by the generator and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompletionPlan {
    /// One completion per call
    Iterated,
    /// `value` completions from a single call through a provider parameter
    NativeN {
        /// Provider parameter carrying the count
        parameter_name: String,
        /// Completions requested
        value: u32,
    },
}

impl CompletionPlan {
    /// Number of logical results this plan produces.
    pub fn completions(&self) -> u32 {
        match self {
            CompletionPlan::Iterated => 1,
            CompletionPlan::NativeN { value, .. } => *value,
        }
    }

    /// Whether the native parameter is used.
    pub fn uses_native_n(&self) -> bool {
        matches!(self, CompletionPlan::NativeN { .. })
    }
}

/// One question's worth of model output within a work item.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Question name
    pub question: String,
    /// Raw completion texts, one per planned completion
    pub completions: Vec<String>,
    /// Validated answers aligned with `completions`
    pub answers: Vec<Result<JsonValue, ValidationError>>,
    /// Whether the response came from the cache
    pub cached: bool,
}

/// State that accumulates while a work item runs and is dropped on release.
#[derive(Default)]
pub struct ExecutionState {
    cache: Option<Arc<dyn ResponseCache>>,
    transcript: Vec<Exchange>,
    cache_used: Vec<(CacheKey, CachedResponse)>,
    released: bool,
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionState")
            .field("has_cache", &self.cache.is_some())
            .field("transcript", &self.transcript.len())
            .field("cache_used", &self.cache_used.len())
            .field("released", &self.released)
            .finish()
    }
}

impl ExecutionState {
    /// Fresh state sharing `cache`.
    pub fn new(cache: Option<Arc<dyn ResponseCache>>) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }

    /// The shared response cache, until release.
    pub fn cache(&self) -> Option<&Arc<dyn ResponseCache>> {
        self.cache.as_ref()
    }

    /// Questions answered so far, in survey order.
    pub fn transcript(&self) -> &[Exchange] {
        &self.transcript
    }

    /// Cache entries read or written so far.
    pub fn cache_used(&self) -> &[(CacheKey, CachedResponse)] {
        &self.cache_used
    }

    /// Whether the state has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn push_exchange(&mut self, exchange: Exchange) {
        self.transcript.push(exchange);
    }

    pub(crate) fn note_cache_entry(&mut self, key: CacheKey, entry: CachedResponse) {
        self.cache_used.push((key, entry));
    }
}

/// One unit of scheduled work.
///
/// An `Iterated` item yields the single result at `original_index`. A
/// `NativeN` item with value `v` yields results at
/// `original_index..original_index + v`, with iterations numbered from
/// `iteration` in the same way.
#[derive(Debug)]
pub struct WorkItem {
    interview: Interview,
    iteration: u32,
    original_index: usize,
    plan: CompletionPlan,
    attempts: u32,
    state: ExecutionState,
}

impl WorkItem {
    /// Create a work item.
    pub fn new(
        interview: Interview,
        iteration: u32,
        original_index: usize,
        plan: CompletionPlan,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> Self {
        Self {
            interview,
            iteration,
            original_index,
            plan,
            attempts: 0,
            state: ExecutionState::new(cache),
        }
    }

    /// A fresh copy with the same identity and no accumulated state.
    pub fn restart(&self) -> Self {
        Self::new(
            self.interview.clone(),
            self.iteration,
            self.original_index,
            self.plan.clone(),
            self.state.cache.clone(),
        )
    }

    /// The base interview.
    pub fn interview(&self) -> &Interview {
        &self.interview
    }

    /// First iteration covered.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// First original index covered.
    pub fn original_index(&self) -> usize {
        self.original_index
    }

    /// Completion plan.
    pub fn plan(&self) -> &CompletionPlan {
        &self.plan
    }

    /// Original indices covered by this item.
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.original_index..self.original_index + self.plan.completions() as usize
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Execution state.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Whether the item has been released by the collector.
    pub fn is_released(&self) -> bool {
        self.state.released
    }

    pub(crate) fn state_mut(&mut self) -> &mut ExecutionState {
        &mut self.state
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Drop the cache reference and transcript, handing back the cache
    /// entries the item used.
    pub fn release(&mut self) -> Vec<(CacheKey, CachedResponse)> {
        self.state.cache = None;
        self.state.transcript = Vec::new();
        self.state.released = true;
        std::mem::take(&mut self.state.cache_used)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = self.indices();
        write!(
            f,
            "#{}..{} {} / {} / {}",
            indices.start,
            indices.end,
            self.interview.agent().name(),
            self.interview.scenario().name(),
            self.interview.model_ref()
        )
    }
}
