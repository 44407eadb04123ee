//! Client for the Gemini `generateContent` endpoint.

use crate::http::{api_key_from_env, count_at, post_json};
use async_trait::async_trait;
use colloquy_core::{CompletionRequest, ModelResponse, TokenUsage};
use colloquy_error::ColloquyResult;
use colloquy_interface::LanguageModel;
use reqwest::Client;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, instrument};

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client.
///
/// Request parameters are placed in `generationConfig`; native
/// multi-completion requests use `candidateCount`.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    parameters: Map<String, JsonValue>,
}

impl GoogleClient {
    /// Client using `GEMINI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not set.
    #[instrument(skip_all, fields(model = %model.as_ref()))]
    pub fn from_env(model: impl AsRef<str>) -> ColloquyResult<Self> {
        let api_key = api_key_from_env("GEMINI_API_KEY")?;
        Ok(Self::new(api_key, model.as_ref()))
    }

    /// Client with an explicit API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GOOGLE_BASE_URL.to_string(),
            model: model.into(),
            parameters: Map::new(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generation parameters merged into every request.
    pub fn with_parameters(mut self, parameters: Map<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    fn body(&self, request: &CompletionRequest) -> JsonValue {
        let mut generation_config = Map::new();
        for (key, value) in self.parameters.iter().chain(request.parameters.iter()) {
            generation_config.insert(key.clone(), value.clone());
        }
        if let Some(completions) = &request.completions {
            generation_config.insert(completions.parameter_name.clone(), json!(completions.count));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.user_prompt }] }],
            "generationConfig": generation_config,
        });
        if !request.system_prompt.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": request.system_prompt }] });
        }
        body
    }
}

/// Token usage reported in a `generateContent` body.
pub(crate) fn google_usage(raw: &JsonValue) -> TokenUsage {
    TokenUsage::new(
        count_at(raw, "/usageMetadata/promptTokenCount"),
        count_at(raw, "/usageMetadata/candidatesTokenCount"),
    )
}

#[async_trait]
impl LanguageModel for GoogleClient {
    #[instrument(
        skip(self, request),
        fields(service = "google", model = %self.model, n = request.completion_count())
    )]
    async fn complete(&self, request: &CompletionRequest) -> ColloquyResult<ModelResponse> {
        let url = self.url(&request.model);
        debug!(url = %url, "Sending generateContent request");

        let raw = post_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key),
            &self.body(request),
        )
        .await?;

        let usage = google_usage(&raw);
        Ok(ModelResponse::new(raw, usage))
    }

    fn inference_service(&self) -> &str {
        "google"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn parameters(&self) -> Map<String, JsonValue> {
        self.parameters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::NativeCompletions;

    #[test]
    fn candidate_count_goes_into_generation_config() {
        let client = GoogleClient::new("k", "gemini-2.0-flash");
        let request = CompletionRequest::builder()
            .model("gemini-2.0-flash")
            .system_prompt("persona")
            .user_prompt("question")
            .completions(Some(NativeCompletions {
                parameter_name: "candidateCount".to_string(),
                count: 3,
            }))
            .build()
            .unwrap();

        let body = client.body(&request);
        assert_eq!(body["generationConfig"]["candidateCount"], json!(3));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("persona"));
        assert_eq!(body["contents"][0]["parts"][0]["text"], json!("question"));
    }

    #[test]
    fn url_targets_model() {
        let client = GoogleClient::new("k", "m").with_base_url("http://localhost:9000/");
        assert_eq!(client.url("m"), "http://localhost:9000/models/m:generateContent");
    }

    #[test]
    fn usage_metadata_is_read() {
        let raw = json!({ "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 9 } });
        assert_eq!(google_usage(&raw), TokenUsage::new(7, 9));
    }
}
