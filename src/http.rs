//! Shared HTTP plumbing for the hosted model services.
//!
//! Both the embedding providers and the chat model speak JSON over HTTP
//! and fail in the same ways, so they share [`ServiceError`] and
//! [`post_json`].
//!
//! # Retry Strategy
//!
//! `post_json` retries only when the caller grants a budget
//! (`max_retries > 0`, never the default):
//! - HTTP 429 (rate limited), 5xx, timeouts, and network errors → retry
//! - other HTTP 4xx → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use reqwest::StatusCode;

/// Failure of an external model service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,
    #[error("authentication rejected (HTTP {status}); check OPENAI_API_KEY")]
    Unauthorized { status: u16 },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("connection failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("model error: {0}")]
    Model(String),
}

impl ServiceError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => ServiceError::Unauthorized {
                status: status.as_u16(),
            },
            429 => ServiceError::RateLimited(body),
            code => ServiceError::Api { status: code, body },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout | ServiceError::Transport(_) | ServiceError::RateLimited(_) => {
                true
            }
            ServiceError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Build a client with a per-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

/// POST a JSON body and decode a JSON response.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, ServiceError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let result = send_once(client, url, bearer, body).await;
        match result {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                tracing::debug!(url, attempt, error = %e, "Retrying request");
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn send_once(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
) -> Result<serde_json::Value, ServiceError> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(ServiceError::from_status(status, body_text))
}
