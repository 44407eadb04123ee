//! Serializable model descriptions.

use crate::{GoogleClient, OpenAiCompatibleClient, ScriptedModel};
use crate::http::api_key_from_env;
use colloquy_error::{ColloquyResult, ConfigError};
use colloquy_interface::LanguageModel;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, instrument};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const AZURE_API_VERSION: &str = "2024-10-21";
const ANTHROPIC_COMPAT_URL: &str = "https://api.anthropic.com/v1/chat/completions";

/// A model as declared in a job file.
///
/// ```toml
/// [[models]]
/// name = "gpt-4o-mini"
/// service = "openai"
/// parameters = { temperature = 0.5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_", into)]
pub struct ModelSpec {
    /// Model identifier sent to the provider
    name: String,
    /// Inference service (openai, azure, google, anthropic, test, or any
    /// OpenAI-compatible service with a `base_url`)
    service: String,
    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key_env: Option<String>,
    /// Parameters sent with every request
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    parameters: Map<String, JsonValue>,
    /// Answers of a `test` model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    script: Vec<String>,
}

impl ModelSpec {
    /// A model with no endpoint override and no parameters.
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            base_url: None,
            api_key_env: None,
            parameters: Map::new(),
            script: Vec::new(),
        }
    }

    fn key(&self, default_var: &str) -> ColloquyResult<String> {
        api_key_from_env(self.api_key_env.as_deref().unwrap_or(default_var))
    }

    /// Build a client for this model.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the service is unknown
    /// and no `base_url` was given.
    #[instrument(skip(self), fields(model = %self.name, service = %self.service))]
    pub fn build(&self) -> ColloquyResult<Arc<dyn LanguageModel>> {
        debug!("Building model client");
        let model: Arc<dyn LanguageModel> = match self.service.as_str() {
            "test" => Arc::new(
                ScriptedModel::new(self.name.clone(), self.script.clone()),
            ),
            "google" => {
                let mut client = GoogleClient::new(self.key("GEMINI_API_KEY")?, self.name.clone())
                    .with_parameters(self.parameters.clone());
                if let Some(url) = &self.base_url {
                    client = client.with_base_url(url.clone());
                }
                Arc::new(client)
            }
            "openai" => Arc::new(self.openai_compatible("OPENAI_API_KEY", OPENAI_URL)?),
            "anthropic" => {
                Arc::new(self.openai_compatible("ANTHROPIC_API_KEY", ANTHROPIC_COMPAT_URL)?)
            }
            "azure" => {
                let base = self.base_url.as_deref().ok_or_else(|| {
                    ConfigError::new(format!("Model {} on azure needs a base_url", self.name))
                })?;
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    base.trim_end_matches('/'),
                    self.name,
                    AZURE_API_VERSION
                );
                Arc::new(
                    OpenAiCompatibleClient::new(
                        self.key("AZURE_OPENAI_API_KEY")?,
                        self.name.clone(),
                        url,
                        "azure",
                    )
                    .with_parameters(self.parameters.clone()),
                )
            }
            other => match &self.base_url {
                Some(url) => Arc::new(
                    OpenAiCompatibleClient::new(
                        self.key(&format!("{}_API_KEY", other.to_uppercase()))?,
                        self.name.clone(),
                        url.clone(),
                        other,
                    )
                    .with_parameters(self.parameters.clone()),
                ),
                None => {
                    return Err(ConfigError::new(format!(
                        "Unknown inference service {} for model {} (set base_url for an OpenAI-compatible endpoint)",
                        other, self.name
                    ))
                    .into());
                }
            },
        };
        Ok(model)
    }

    fn openai_compatible(
        &self,
        default_var: &str,
        default_url: &str,
    ) -> ColloquyResult<OpenAiCompatibleClient> {
        let url = self.base_url.as_deref().unwrap_or(default_url);
        Ok(
            OpenAiCompatibleClient::new(self.key(default_var)?, self.name.clone(), url, &*self.service)
                .with_parameters(self.parameters.clone()),
        )
    }
}
