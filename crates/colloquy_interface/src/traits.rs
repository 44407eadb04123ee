//! Trait definitions for models, caches and validators.

use async_trait::async_trait;
use colloquy_core::{CacheKey, CachedResponse, CompletionRequest, ModelResponse, Question};
use colloquy_error::{ColloquyResult, ValidationError};
use serde_json::Value as JsonValue;

/// Core trait that every model backend implements.
///
/// Implementations raise a rate-limit-class `ModelError` when the provider
/// reports an exceeded quota, so the engine can tell it apart from
/// permanent failures.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Get a response for a prompt, possibly with several native completions.
    async fn complete(&self, request: &CompletionRequest) -> ColloquyResult<ModelResponse>;

    /// Provider identifier keying the native-N capability table
    /// (e.g. "openai", "google", "test").
    fn inference_service(&self) -> &str;

    /// Model identifier (e.g. "gpt-4o-mini").
    fn model_name(&self) -> &str;

    /// Parameters sent with every request to this model.
    fn parameters(&self) -> serde_json::Map<String, JsonValue> {
        serde_json::Map::new()
    }
}

/// Key-value store of previously seen model responses.
///
/// The engine consults the cache before dispatching a call and writes live
/// responses back after it.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a stored response.
    async fn fetch(&self, key: &CacheKey) -> ColloquyResult<Option<CachedResponse>>;

    /// Store a response.
    async fn store(&self, key: CacheKey, entry: CachedResponse) -> ColloquyResult<()>;
}

/// Turns a raw completion into a parsed answer.
pub trait AnswerValidator: Send + Sync {
    /// Parse `raw` as an answer to `question`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` when the completion cannot be interpreted.
    fn validate(&self, question: &Question, raw: &str) -> Result<JsonValue, ValidationError>;
}
