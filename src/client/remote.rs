//! HTTP client for the gateway's inference endpoints.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{InferRequest, InferResponse};
use crate::{MuninnError, Result};

use super::RemoteInference;

/// reqwest-based [`RemoteInference`] implementation.
///
/// Maps the wire contract's status classes back into the error taxonomy so
/// the orchestrator sees the same typed errors the gateway raised: 429 →
/// `RateLimited` (honouring `retry-after`), 503 → `Retryable`, 504 →
/// `InferenceTimeout`, 422 → `InvalidInput`, anything else non-2xx → `Api`.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a shared HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: None,
        }
    }

    /// Set the bearer subject presented as caller identity.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[async_trait]
impl RemoteInference for HttpRemote {
    async fn infer(&self, request: &InferRequest, idem_token: &str) -> Result<InferResponse> {
        let url = format!("{}/v1/infer/{}", self.base_url, request.operation);
        let body = serde_json::json!({
            "image_url": request.image_url,
            "params": request.params,
        });

        let mut http_request = self
            .client
            .post(&url)
            .header("idempotency-key", idem_token)
            .json(&body);
        if let Some(ref bearer) = self.bearer {
            http_request = http_request.bearer_auth(bearer);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| MuninnError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<InferResponse>()
                .await
                .map_err(|e| MuninnError::Http(format!("malformed gateway response: {e}")));
        }

        let retry_after = retry_after_header(&response);
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            429 => MuninnError::RateLimited { retry_after },
            503 => MuninnError::Retryable { retry_after },
            504 => MuninnError::InferenceTimeout,
            422 => MuninnError::InvalidInput(message),
            code => MuninnError::Api {
                status: code,
                message,
            },
        })
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
