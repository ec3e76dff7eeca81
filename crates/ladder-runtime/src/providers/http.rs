//! Shared HTTP plumbing for the built-in backends.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::ProviderError;

pub(super) fn client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ProviderError::HttpError(format!("failed to build HTTP client: {}", e)))
}

/// Read `base_url` from backend options, validating the scheme.
pub(super) fn base_url(config: &JsonValue, default: &str) -> Result<String, ProviderError> {
    let url = config["base_url"].as_str().unwrap_or(default);
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ProviderError::NotConfigured(
            "base_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Send a request and decode a JSON body, mapping failures onto
/// [`ProviderError`].
pub(super) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::HttpError(e.to_string())
        }
    })?;

    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthError);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Pull a readable message out of an error body. Both OpenAI
/// (`{"error": {"message": ..}}`) and Ollama (`{"error": ".."}`) shapes are
/// understood; anything else is returned as-is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
