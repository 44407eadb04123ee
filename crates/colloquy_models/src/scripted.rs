//! Offline model answering from a fixed script.

use async_trait::async_trait;
use colloquy_core::{CompletionRequest, ModelResponse, TokenUsage};
use colloquy_error::ColloquyResult;
use colloquy_interface::LanguageModel;
use serde_json::{Value as JsonValue, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::instrument;

/// Model that cycles through scripted answers without any network access.
///
/// Responses use the chat-completions shape with one choice per requested
/// completion, so native multi-completion handling is exercised exactly as it
/// is against a live provider.
///
/// # Example
///
/// ```
/// use colloquy_models::ScriptedModel;
/// use colloquy_interface::LanguageModel;
///
/// let model = ScriptedModel::new("echo", vec!["yes".into(), "no".into()]);
/// assert_eq!(model.inference_service(), "test");
/// ```
#[derive(Debug)]
pub struct ScriptedModel {
    name: String,
    service: String,
    script: Vec<String>,
    delay: Duration,
    cursor: AtomicUsize,
}

impl ScriptedModel {
    /// A scripted model under the `test` service.
    ///
    /// An empty script answers with an empty string.
    pub fn new(name: impl Into<String>, script: Vec<String>) -> Self {
        Self {
            name: name.into(),
            service: "test".to_string(),
            script,
            delay: Duration::ZERO,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Report a different inference service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Wait this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    fn next_answer(&self, offset: usize) -> String {
        if self.script.is_empty() {
            return String::new();
        }
        self.script[offset % self.script.len()].clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    #[instrument(skip(self, request), fields(model = %self.name, n = request.completion_count()))]
    async fn complete(&self, request: &CompletionRequest) -> ColloquyResult<ModelResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let count = request.completion_count() as usize;
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let choices: Vec<JsonValue> = (0..count)
            .map(|i| {
                json!({
                    "index": i,
                    "message": { "role": "assistant", "content": self.next_answer(start + i) }
                })
            })
            .collect();

        let prompt_tokens = (request.system_prompt.len() + request.user_prompt.len()) as u64 / 4;
        let completion_tokens = choices.len() as u64 * 4;
        Ok(ModelResponse::new(
            json!({ "model": self.name, "choices": choices }),
            TokenUsage::new(prompt_tokens, completion_tokens),
        ))
    }

    fn inference_service(&self) -> &str {
        &self.service
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
