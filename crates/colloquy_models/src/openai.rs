//! Client for OpenAI-compatible chat-completions endpoints.

use crate::http::{api_key_from_env, count_at, post_json};
use async_trait::async_trait;
use colloquy_core::{CompletionRequest, ModelResponse, TokenUsage};
use colloquy_error::ColloquyResult;
use colloquy_interface::LanguageModel;
use reqwest::Client;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, instrument};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completions client.
///
/// Works with any server implementing the OpenAI wire format. Native
/// multi-completion requests are sent through the request's completion
/// parameter (normally `n`), and every returned choice is kept in the raw
/// response.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    service: String,
    parameters: Map<String, JsonValue>,
}

impl OpenAiCompatibleClient {
    /// Client for api.openai.com using `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not set.
    #[instrument(skip_all, fields(model = %model.as_ref()))]
    pub fn openai(model: impl AsRef<str>) -> ColloquyResult<Self> {
        let api_key = api_key_from_env("OPENAI_API_KEY")?;
        Ok(Self::new(api_key, model.as_ref(), OPENAI_URL, "openai"))
    }

    /// Client for an arbitrary endpoint.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        url: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            url: url.into(),
            model: model.into(),
            service: service.into(),
            parameters: Map::new(),
        }
    }

    /// Parameters merged into every request body (temperature, max_tokens, ...).
    pub fn with_parameters(mut self, parameters: Map<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }

    fn body(&self, request: &CompletionRequest) -> JsonValue {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        messages.push(json!({ "role": "user", "content": request.user_prompt }));

        let mut body = Map::new();
        for (key, value) in self.parameters.iter().chain(request.parameters.iter()) {
            body.insert(key.clone(), value.clone());
        }
        body.insert("model".to_string(), JsonValue::String(request.model.clone()));
        body.insert("messages".to_string(), JsonValue::Array(messages));
        if let Some(completions) = &request.completions {
            body.insert(completions.parameter_name.clone(), json!(completions.count));
        }
        JsonValue::Object(body)
    }
}

/// Token usage reported in a chat-completions body.
pub(crate) fn openai_usage(raw: &JsonValue) -> TokenUsage {
    TokenUsage::new(
        count_at(raw, "/usage/prompt_tokens"),
        count_at(raw, "/usage/completion_tokens"),
    )
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    #[instrument(
        skip(self, request),
        fields(service = %self.service, model = %self.model, n = request.completion_count())
    )]
    async fn complete(&self, request: &CompletionRequest) -> ColloquyResult<ModelResponse> {
        let body = self.body(request);
        debug!(url = %self.url, "Sending chat completion request");

        let raw = post_json(
            self.client.post(&self.url).bearer_auth(&self.api_key),
            &body,
        )
        .await?;

        let usage = openai_usage(&raw);
        Ok(ModelResponse::new(raw, usage))
    }

    fn inference_service(&self) -> &str {
        &self.service
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn parameters(&self) -> Map<String, JsonValue> {
        self.parameters.clone()
    }
}
