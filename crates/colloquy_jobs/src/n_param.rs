//! Native multi-completion planning and response splitting.

use colloquy_core::ModelNSupport;
use colloquy_interface::LanguageModel;
use colloquy_rate_limit::ColloquyConfig;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Decides when one call can serve several repetitions of a prompt.
///
/// The capability table is keyed by inference service and is fixed once the
/// handler is built. Services without an entry are treated as unsupported.
///
/// # Examples
///
/// ```
/// use colloquy_core::ModelNSupport;
/// use colloquy_jobs::NParameterHandler;
///
/// let handler = NParameterHandler::default()
///     .with_provider("openai", ModelNSupport::native("n", 128));
/// assert_eq!(
///     handler.batching_strategy_for_service("openai", 200),
///     vec![("n".to_string(), 128), ("n".to_string(), 72)]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NParameterHandler {
    table: HashMap<String, ModelNSupport>,
}

impl NParameterHandler {
    /// Handler over an explicit capability table.
    pub fn new(table: HashMap<String, ModelNSupport>) -> Self {
        Self { table }
    }

    /// Handler over the `[providers.<service>.n_support]` entries of a config.
    pub fn from_config(config: &ColloquyConfig) -> Self {
        Self::new(config.n_support_table())
    }

    /// Add or replace the capability of one service.
    pub fn with_provider(mut self, service: impl Into<String>, support: ModelNSupport) -> Self {
        self.table.insert(service.into(), support);
        self
    }

    /// Capability record of a service.
    pub fn support_for(&self, service: &str) -> ModelNSupport {
        self.table
            .get(service)
            .cloned()
            .unwrap_or_else(ModelNSupport::unsupported)
    }

    /// Whether `n` completions for `model` should use the native parameter.
    pub fn should_use_native_n(&self, model: &dyn LanguageModel, n: u32) -> bool {
        self.should_use_native_n_for_service(model.inference_service(), n)
    }

    /// [`should_use_native_n`](Self::should_use_native_n) keyed by service name.
    pub fn should_use_native_n_for_service(&self, service: &str, n: u32) -> bool {
        let support = self.support_for(service);
        n > 1 && support.supports_n && !support.parameter_name.is_empty()
    }

    /// Split `n` completions for `model` into per-call batches.
    ///
    /// Unsupported providers get `n` entries of `("", 1)`. Supported ones get
    /// greedy batches of at most the provider cap.
    pub fn batching_strategy(&self, model: &dyn LanguageModel, n: u32) -> Vec<(String, u32)> {
        self.batching_strategy_for_service(model.inference_service(), n)
    }

    /// [`batching_strategy`](Self::batching_strategy) keyed by service name.
    pub fn batching_strategy_for_service(&self, service: &str, n: u32) -> Vec<(String, u32)> {
        if !self.should_use_native_n_for_service(service, n) {
            return (0..n).map(|_| (String::new(), 1)).collect();
        }

        let support = self.support_for(service);
        let cap = support.max_value.max(1);
        let mut batches = Vec::with_capacity(n.div_ceil(cap) as usize);
        let mut remaining = n;
        while remaining > 0 {
            let size = remaining.min(cap);
            batches.push((support.parameter_name.clone(), size));
            remaining -= size;
        }
        debug!(service, n, batches = batches.len(), "Planned native completion batches");
        batches
    }

    /// Pull `n` completion texts out of a raw provider response.
    ///
    /// Understands chat-completions `choices[].message.content` (and legacy
    /// `choices[].text`), Gemini `candidates[].content.parts[].text` and a bare
    /// string. Missing completions are padded with empty strings and logged.
    pub fn extract_multiple_completions(&self, response: &JsonValue, n: usize) -> Vec<String> {
        let mut completions = completions_in(response);
        if completions.len() < n {
            warn!(
                expected = n,
                found = completions.len(),
                "Response carried fewer completions than requested; padding with empty answers"
            );
            completions.resize(n, String::new());
        }
        completions.truncate(n);
        completions
    }
}

fn completions_in(response: &JsonValue) -> Vec<String> {
    if let Some(text) = response.as_str() {
        return vec![text.to_string()];
    }

    if let Some(choices) = response.get("choices").and_then(JsonValue::as_array) {
        return choices
            .iter()
            .map(|choice| {
                choice
                    .pointer("/message/content")
                    .or_else(|| choice.get("text"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
    }

    if let Some(candidates) = response.get("candidates").and_then(JsonValue::as_array) {
        return candidates
            .iter()
            .map(|candidate| {
                candidate
                    .pointer("/content/parts")
                    .and_then(JsonValue::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(|part| part.get("text").and_then(JsonValue::as_str))
                            .collect::<String>()
                    })
                    .unwrap_or_default()
            })
            .collect();
    }

    Vec::new()
}
