//! Shared HTTP client and status mapping.

use std::sync::OnceLock;

use crate::error::CustomOAuthError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Turn a non-success response into an error carrying the body text.
pub async fn error_from_response(resp: reqwest::Response) -> CustomOAuthError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or(body);
    CustomOAuthError::api(status, message)
}

/// Pull `error.message` or `error` out of a JSON error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}
