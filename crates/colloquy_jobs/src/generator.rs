//! Lazy expansion of a job into work items.

use crate::{CompletionPlan, JobSpec, NParameterHandler, WorkItem};
use colloquy_interface::ResponseCache;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Single-pass iterator over the work items of a job.
///
/// Base interviews are visited in job order and all repetitions of one base
/// interview are yielded consecutively. Original indices are dense and
/// assigned in yield order, so the same job and `n` always produce the same
/// sequence.
pub struct InterviewGenerator {
    job: JobSpec,
    handler: Arc<NParameterHandler>,
    cache: Option<Arc<dyn ResponseCache>>,
    n: u32,
    next_base: usize,
    next_index: usize,
    pending: VecDeque<WorkItem>,
}

impl std::fmt::Debug for InterviewGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewGenerator")
            .field("job", &self.job)
            .field("n", &self.n)
            .field("next_base", &self.next_base)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl InterviewGenerator {
    /// Generator for `n` repetitions of every base interview of `job`.
    pub fn new(
        job: JobSpec,
        n: u32,
        handler: Arc<NParameterHandler>,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> Self {
        Self {
            job,
            handler,
            cache,
            n,
            next_base: 0,
            next_index: 0,
            pending: VecDeque::new(),
        }
    }

    /// Logical results the whole job produces.
    pub fn expected_results(&self) -> usize {
        self.job.base_interview_count() * self.n as usize
    }

    fn expand_next_base(&mut self) -> bool {
        let Some(interview) = self.job.interview(self.next_base) else {
            return false;
        };
        self.next_base += 1;

        let batches = self.handler.batching_strategy(interview.model().as_ref(), self.n);
        let mut iteration = 0u32;
        for (parameter_name, size) in batches {
            let plans = if parameter_name.is_empty() || size <= 1 {
                vec![CompletionPlan::Iterated; size as usize]
            } else {
                vec![CompletionPlan::NativeN {
                    parameter_name,
                    value: size,
                }]
            };
            for plan in plans {
                let completions = plan.completions();
                let item = WorkItem::new(
                    interview.clone(),
                    iteration,
                    self.next_index,
                    plan,
                    self.cache.clone(),
                );
                trace!(item = %item, "Generated work item");
                self.pending.push_back(item);
                iteration += completions;
                self.next_index += completions as usize;
            }
        }
        true
    }
}

impl Iterator for InterviewGenerator {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        while self.pending.is_empty() {
            if !self.expand_next_base() {
                return None;
            }
        }
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use colloquy_core::{Agent, CompletionRequest, ModelNSupport, ModelResponse, Question, Survey};
    use colloquy_error::ColloquyResult;
    use colloquy_interface::LanguageModel;

    struct Named(&'static str);

    #[async_trait]
    impl LanguageModel for Named {
        async fn complete(&self, _request: &CompletionRequest) -> ColloquyResult<ModelResponse> {
            unreachable!("generator tests never call the model")
        }

        fn inference_service(&self) -> &str {
            self.0
        }

        fn model_name(&self) -> &str {
            "m"
        }
    }

    fn job(service: &'static str, agents: usize) -> JobSpec {
        JobSpec::new(Survey::new(vec![Question::free_text("q", "How?")]))
            .with_agents((0..agents).map(|i| Agent::new(format!("agent-{}", i))))
            .with_model(Arc::new(Named(service)))
    }

    fn handler() -> Arc<NParameterHandler> {
        Arc::new(NParameterHandler::default().with_provider("wide", ModelNSupport::native("n", 128)))
    }

    #[test]
    fn fallback_yields_one_item_per_iteration() {
        let items: Vec<WorkItem> = InterviewGenerator::new(job("narrow", 2), 3, handler(), None).collect();
        assert_eq!(items.len(), 6);
        let indices: Vec<usize> = items.iter().map(|i| i.original_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        let iterations: Vec<u32> = items.iter().map(|i| i.iteration()).collect();
        assert_eq!(iterations, vec![0, 1, 2, 0, 1, 2]);
        assert!(items.iter().all(|i| !i.plan().uses_native_n()));
    }

    #[test]
    fn native_batches_advance_index_by_batch_size() {
        let generator = InterviewGenerator::new(job("wide", 2), 200, handler(), None);
        assert_eq!(generator.expected_results(), 400);
        let items: Vec<WorkItem> = generator.collect();
        assert_eq!(items.len(), 4);
        let shape: Vec<(usize, u32, u32)> = items
            .iter()
            .map(|i| (i.original_index(), i.iteration(), i.plan().completions()))
            .collect();
        assert_eq!(shape, vec![(0, 0, 128), (128, 128, 72), (200, 0, 128), (328, 128, 72)]);
    }

    #[test]
    fn unnamed_native_parameter_still_covers_every_index() {
        let handler = Arc::new(NParameterHandler::default().with_provider(
            "blank",
            ModelNSupport {
                supports_n: true,
                parameter_name: String::new(),
                max_value: 8,
            },
        ));
        let generator = InterviewGenerator::new(job("blank", 1), 4, handler, None);
        let expected = generator.expected_results();
        let items: Vec<WorkItem> = generator.collect();

        let covered: usize = items.iter().map(|i| i.plan().completions() as usize).sum();
        assert_eq!(covered, expected);
        let indices: Vec<usize> = items.iter().map(|i| i.original_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(items.iter().all(|i| !i.plan().uses_native_n()));
    }

    #[test]
    fn generation_is_deterministic() {
        let a: Vec<String> = InterviewGenerator::new(job("wide", 3), 5, handler(), None)
            .map(|i| i.to_string())
            .collect();
        let b: Vec<String> = InterviewGenerator::new(job("wide", 3), 5, handler(), None)
            .map(|i| i.to_string())
            .collect();
        assert_eq!(a, b);
    }
}
