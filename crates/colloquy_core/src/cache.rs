//! Cache keys and entries for model responses.

use crate::{CompletionRequest, ModelResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash identifying a cacheable model call.
///
/// The key covers the model, the service, the request parameters, both
/// prompts, the iteration and the native completion count, so repeated
/// iterations of the same prompt map to distinct entries.
///
/// # Examples
///
/// ```
/// use colloquy_core::{CacheKey, CompletionRequest};
///
/// let request = CompletionRequest::builder()
///     .model("m")
///     .user_prompt("hi")
///     .build()
///     .unwrap();
/// let first = CacheKey::for_request("test", &request, 0);
/// let second = CacheKey::for_request("test", &request, 1);
/// assert_ne!(first, second);
/// assert_eq!(first, CacheKey::for_request("test", &request, 0));
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
#[display("{}", &_0[.._0.len().min(12)])]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request at a given iteration.
    pub fn for_request(service: &str, request: &CompletionRequest, iteration: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.model.as_bytes());
        hasher.update([0]);
        hasher.update(service.as_bytes());
        hasher.update([0]);
        // serde_json::Map is ordered by key, so this is stable
        hasher.update(serde_json::to_string(&request.parameters).unwrap_or_default());
        hasher.update([0]);
        hasher.update(request.system_prompt.as_bytes());
        hasher.update([0]);
        hasher.update(request.user_prompt.as_bytes());
        hasher.update([0]);
        hasher.update(iteration.to_le_bytes());
        hasher.update(request.completion_count().to_le_bytes());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The response as originally received
    pub response: ModelResponse,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Wrap a fresh response.
    pub fn new(response: ModelResponse) -> Self {
        Self {
            response,
            created_at: Utc::now(),
        }
    }
}
