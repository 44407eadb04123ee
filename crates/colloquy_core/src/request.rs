//! Request and response types exchanged with a model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Provider-native request for several completions of the same prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeCompletions {
    /// Provider parameter carrying the count (e.g. `n`, `candidateCount`)
    pub parameter_name: String,
    /// Number of completions requested in this call
    pub count: u32,
}

/// A single prompt sent to a model.
///
/// # Examples
///
/// ```
/// use colloquy_core::{CompletionRequest, NativeCompletions};
///
/// let request = CompletionRequest::builder()
///     .model("gpt-4o-mini")
///     .system_prompt("You are a nurse.")
///     .user_prompt("How was your shift?")
///     .completions(Some(NativeCompletions {
///         parameter_name: "n".to_string(),
///         count: 4,
///     }))
///     .build()
///     .unwrap();
///
/// assert_eq!(request.completion_count(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[builder(setter(into))]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Persona/system prompt
    #[builder(default)]
    pub system_prompt: String,
    /// Question prompt
    pub user_prompt: String,
    /// Provider parameters passed through verbatim (temperature, max_tokens, ...)
    #[builder(default)]
    pub parameters: Map<String, JsonValue>,
    /// Native multi-completion request, when the provider supports one
    #[builder(default)]
    pub completions: Option<NativeCompletions>,
}

impl CompletionRequest {
    /// Creates a new request builder.
    pub fn builder() -> CompletionRequestBuilder {
        CompletionRequestBuilder::default()
    }

    /// Number of completions this request asks for.
    pub fn completion_count(&self) -> u32 {
        self.completions.as_ref().map(|c| c.count).unwrap_or(1)
    }

    /// Rough token estimate used for rate limiting before the call is made.
    ///
    /// Four characters per token, plus a fixed allowance per completion for
    /// the answer.
    pub fn estimated_tokens(&self) -> u64 {
        let prompt_chars = self.system_prompt.len() + self.user_prompt.len();
        (prompt_chars as u64 / 4) + 50 * u64::from(self.completion_count())
    }
}

/// Tokens consumed by a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a usage record.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Prompt plus completion tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Raw provider response plus the usage it reported.
///
/// The body is kept as JSON so completions can be extracted according to the
/// provider's response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Raw response body
    pub raw: JsonValue,
    /// Tokens consumed by the call
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Create a response.
    pub fn new(raw: JsonValue, usage: TokenUsage) -> Self {
        Self { raw, usage }
    }
}
