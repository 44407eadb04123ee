//! Restores index order and releases finished work items in batches.

use crate::{CompletedItem, InterviewRecord, InterviewResult, Results, TaskHistory, WorkItem};
use colloquy_core::{CacheKey, CachedResponse};
use colloquy_error::{ColloquyResult, JobError, JobErrorKind};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Items to capture between releases, scaled by job size.
///
/// Small jobs release often to keep peak memory low; large jobs release less
/// often to amortize the cost of each release.
pub fn release_batch_size(expected_results: usize) -> usize {
    match expected_results {
        0..=100 => 5,
        101..=1000 => 20,
        _ => 50,
    }
}

/// Consumes completed items in any order and yields results in index order.
///
/// Insertion is `O(log n)`. Captured work items are kept until the current
/// batch fills; the whole batch is then released, which drops the items'
/// model, cache and transcript references and keeps only the cache entries
/// they used.
#[derive(Debug)]
pub struct ResultCollector {
    results: BTreeMap<usize, InterviewResult>,
    awaiting_release: Vec<WorkItem>,
    history: TaskHistory,
    cache: BTreeMap<CacheKey, CachedResponse>,
    expected: usize,
    batch_size: usize,
    released_items: usize,
}

impl ResultCollector {
    /// Collector for a job producing `expected` results.
    pub fn new(expected: usize) -> Self {
        let batch_size = release_batch_size(expected);
        Self {
            results: BTreeMap::new(),
            awaiting_release: Vec::with_capacity(batch_size),
            history: TaskHistory::default(),
            cache: BTreeMap::new(),
            expected,
            batch_size,
            released_items: 0,
        }
    }

    /// Use a fixed release batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Items captured per release.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Results expected from the whole job.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Capture one completed item.
    ///
    /// Returns the original indices that were inserted, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIndex` if any index was already captured; nothing
    /// from the item is kept in that case.
    pub fn capture(&mut self, completed: CompletedItem) -> ColloquyResult<Vec<usize>> {
        if let Some(duplicate) = completed
            .results()
            .iter()
            .map(|r| *r.order())
            .find(|order| self.results.contains_key(order))
        {
            return Err(JobError::new(JobErrorKind::DuplicateIndex(duplicate)).into());
        }

        let (item, results, exceptions, _) = completed.into_parts();
        let mut inserted = Vec::with_capacity(results.len());
        for result in results {
            let order = *result.order();
            trace!(order, "Captured result");
            self.results.insert(order, result);
            inserted.push(order);
        }
        inserted.sort_unstable();

        self.history.record_exceptions(exceptions);
        self.awaiting_release.push(item);
        if self.awaiting_release.len() >= self.batch_size {
            self.release_pending();
        }
        Ok(inserted)
    }

    /// Release every captured item not yet released.
    pub fn release_pending(&mut self) -> usize {
        let released = self.awaiting_release.len();
        if released == 0 {
            return 0;
        }

        for mut item in self.awaiting_release.drain(..) {
            let exceptions = self.history.exceptions_within(item.indices()).count();
            let used = item.release();
            let interview = item.interview();
            self.history.record_interview(InterviewRecord::new(
                item.original_index(),
                item.iteration(),
                item.plan().completions(),
                interview.agent().name(),
                interview.scenario().name(),
                interview.model_ref(),
                item.attempts(),
                used.len(),
                exceptions,
                item.is_released(),
            ));
            self.cache.extend(used);
        }
        self.awaiting_release.shrink_to(self.batch_size);
        self.released_items += released;
        debug!(
            released,
            total_released = self.released_items,
            captured = self.results.len(),
            "Released work item batch"
        );
        released
    }

    /// Captured items still holding their execution state.
    pub fn pending_release(&self) -> usize {
        self.awaiting_release.len()
    }

    /// The items awaiting release.
    pub fn awaiting_release(&self) -> &[WorkItem] {
        &self.awaiting_release
    }

    /// Items released so far.
    pub fn released_items(&self) -> usize {
        self.released_items
    }

    /// A captured result.
    pub fn get(&self, order: usize) -> Option<&InterviewResult> {
        self.results.get(&order)
    }

    /// Results captured so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// History recorded so far.
    pub fn history(&self) -> &TaskHistory {
        &self.history
    }

    /// Release what is left and build the results container.
    pub fn finish(mut self, interrupted: bool) -> Results {
        self.release_pending();
        Results::new(
            self.results.into_values().collect(),
            self.history,
            self.cache,
            interrupted,
            self.expected,
        )
    }
}
