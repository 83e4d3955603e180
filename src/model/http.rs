//! HTTP-backed model collaborator.
//!
//! Calls a hosted model service per operation: one POST with the input
//! reference and parameters, one JSON body back with payload and
//! confidence. This is the production shape — the heavy models live in
//! their own services with their own hardware, and the gateway only ever
//! speaks this narrow contract to them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{Inference, Operation, OperationParams};
use crate::{MuninnError, Result};

use super::InferenceModel;

/// Endpoint map for an [`HttpModel`].
#[derive(Debug, Clone, Default)]
pub struct HttpModelConfig {
    endpoints: HashMap<Operation, String>,
}

impl HttpModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the endpoint URL serving `operation`.
    pub fn endpoint(mut self, operation: Operation, url: impl Into<String>) -> Self {
        self.endpoints.insert(operation, url.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    payload: serde_json::Value,
    confidence: f32,
}

/// reqwest-based [`InferenceModel`] against per-operation HTTP endpoints.
pub struct HttpModel {
    client: reqwest::Client,
    config: HttpModelConfig,
}

impl HttpModel {
    pub fn new(config: HttpModelConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Use a shared HTTP client (connection pooling across collaborators).
    pub fn with_client(client: reqwest::Client, config: HttpModelConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl InferenceModel for HttpModel {
    fn name(&self) -> &str {
        "http"
    }

    async fn infer(
        &self,
        operation: Operation,
        image_url: &str,
        params: &OperationParams,
        deadline: Duration,
    ) -> Result<Inference> {
        let endpoint = self.config.endpoints.get(&operation).ok_or_else(|| {
            MuninnError::Configuration(format!("no model endpoint for {operation}"))
        })?;

        let body = serde_json::json!({
            "image_url": image_url,
            "params": params,
        });

        let response = self
            .client
            .post(endpoint)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MuninnError::InferenceTimeout
                } else {
                    MuninnError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MuninnError::InferenceFailed(format!(
                "model service returned {status}: {message}"
            )));
        }

        let reply: ModelReply = response
            .json()
            .await
            .map_err(|e| MuninnError::InferenceFailed(format!("malformed model reply: {e}")))?;
        Ok(Inference::new(reply.payload, reply.confidence))
    }
}
