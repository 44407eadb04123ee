//! Shared HTTP plumbing for the JSON model clients.

use colloquy_error::{ColloquyResult, ModelError, ModelErrorKind};
use reqwest::RequestBuilder;
use reqwest::header::RETRY_AFTER;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Send `body` and return the parsed JSON response.
///
/// Status codes are classified so that 429 surfaces as the rate-limit class
/// and carries any `Retry-After` hint the provider sent.
pub(crate) async fn post_json(request: RequestBuilder, body: &JsonValue) -> ColloquyResult<JsonValue> {
    let response = request.json(body).send().await.map_err(|e| {
        ModelError::new(ModelErrorKind::Transport(format!("Request failed: {}", e)))
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let message = response.text().await.unwrap_or_default();
        let error = status_error(status.as_u16(), retry_after.as_deref(), message);
        warn!(status = status.as_u16(), error = %error, "Model call rejected");
        return Err(error.into());
    }

    let value: JsonValue = response.json().await.map_err(|e| {
        ModelError::new(ModelErrorKind::MalformedResponse(format!(
            "Failed to parse response body: {}",
            e
        )))
    })?;
    debug!("Model call succeeded");
    Ok(value)
}

/// Classify a non-success HTTP status.
#[track_caller]
pub(crate) fn status_error(status: u16, retry_after: Option<&str>, message: String) -> ModelError {
    if status == 429 {
        ModelError::new(ModelErrorKind::RateLimited {
            retry_after_ms: retry_after.and_then(parse_retry_after_ms),
            message,
        })
    } else {
        ModelError::new(ModelErrorKind::Http {
            status_code: status,
            message,
        })
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after_ms(value: &str) -> Option<u64> {
    let seconds: f64 = value.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0) as u64)
}

/// Unsigned integer at a JSON pointer, zero when absent.
pub(crate) fn count_at(value: &JsonValue, pointer: &str) -> u64 {
    value.pointer(pointer).and_then(JsonValue::as_u64).unwrap_or(0)
}

/// Read an API key from the environment.
pub(crate) fn api_key_from_env(var: &str) -> ColloquyResult<String> {
    std::env::var(var)
        .map_err(|_| ModelError::new(ModelErrorKind::MissingApiKey(var.to_string())).into())
}
