//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};

use crate::error::{Result, StudioError};

/// Build a client with a request timeout.
pub fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StudioError::internal(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure (connect, timeout, body read) to a retryable error.
pub fn transport_error(provider: &str, err: reqwest::Error) -> StudioError {
    StudioError::transport(provider, err.to_string())
}

/// Pass successful responses through; classify everything else.
pub async fn check_response(provider: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = resp.text().await.unwrap_or_default();

    Err(StudioError::from_status(
        provider,
        status.as_u16(),
        retry_after.as_deref(),
        body,
    ))
}

/// Decode a JSON body, naming the provider on failure.
pub async fn read_json<T: serde::de::DeserializeOwned>(provider: &str, resp: Response) -> Result<T> {
    resp.json::<T>().await.map_err(|e| StudioError::Upstream {
        provider: provider.to_string(),
        status: None,
        message: format!("invalid response body: {}", e),
    })
}
