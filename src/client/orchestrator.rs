//! Adaptive client orchestrator.
//!
//! One capture, one answer: the orchestrator decides per request whether to
//! call the remote gateway (accurate, slow, unreliable) or the on-device
//! degraded model (fast, lower quality), bounded by a wall-clock budget.
//! Remote is always preferred while online — higher accuracy outweighs
//! latency within the budget — and only failure or timeout triggers the
//! fallback, never low confidence. A low-confidence remote result is
//! returned tagged with its score, not discarded.
//!
//! The decision tree is an explicit tagged state machine rather than nested
//! branching, so every transition and its trigger is enumerable:
//!
//! ```text
//! CheckNetwork ──offline──────────────► LocalPath
//!      │ online                            │
//!      ▼                                   │ success        failure
//! RemoteAttempt ──error/deadline──► LocalPath ──► Done        │
//!      │ success                                              ▼
//!      └────────────────────────────► Done                 Failed
//! ```
//!
//! Each attempt's decision is irrevocable: a fallback builds a new phase,
//! it never mutates the one that failed. Cancelling the remote attempt at
//! the deadline drops the request future (and with it the connection)
//! before the local path starts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::InferenceModel;
use crate::telemetry;
use crate::types::{InferRequest, InferResponse};
use crate::{MuninnError, Result};

/// Read-only connectivity observation.
///
/// May lag true connectivity; that is acceptable, because a stale "online"
/// just means the first remote attempt fails fast and falls back.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

/// The remote gateway boundary as seen from the client.
#[async_trait]
pub trait RemoteInference: Send + Sync {
    async fn infer(&self, request: &InferRequest, idem_token: &str) -> Result<InferResponse>;
}

/// Latency budgets for one capture.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// End-to-end wall-clock budget for the remote attempt. Default: 4s.
    pub remote_deadline: Duration,
    /// Budget for the local degraded model. Default: 2s.
    pub local_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            remote_deadline: Duration::from_secs(4),
            local_timeout: Duration::from_secs(2),
        }
    }
}

/// Which path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Remote,
    Local,
}

/// Gateway cache metadata, present only for remote results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub cache_hit: bool,
    pub ttl_seconds: u64,
    pub request_id: String,
}

/// Final outcome of a capture: the answer to speak, its confidence, and
/// where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub payload: serde_json::Value,
    pub confidence: f32,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMeta>,
}

/// Phases of one capture. Consumed by value on every transition.
enum Phase {
    CheckNetwork,
    RemoteAttempt,
    LocalPath,
    Done(CaptureOutcome),
}

/// Per-capture decision procedure over the remote gateway and the local
/// degraded model.
pub struct AdaptiveOrchestrator {
    remote: Arc<dyn RemoteInference>,
    local: Arc<dyn InferenceModel>,
    network: Arc<dyn NetworkStatus>,
    config: OrchestratorConfig,
}

impl AdaptiveOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteInference>,
        local: Arc<dyn InferenceModel>,
        network: Arc<dyn NetworkStatus>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            remote,
            local,
            network,
            config,
        }
    }

    /// Run one capture to its final outcome.
    ///
    /// Returns an error only when both paths are exhausted: every
    /// remote-side error becomes a local attempt first. The caller always
    /// gets a final outcome — success or explicit failure — to hand to the
    /// feedback channel.
    pub async fn run(&self, request: InferRequest) -> Result<CaptureOutcome> {
        let mut phase = Phase::CheckNetwork;
        loop {
            phase = match phase {
                Phase::CheckNetwork => {
                    if self.network.is_online() {
                        Phase::RemoteAttempt
                    } else {
                        debug!(operation = %request.operation, "offline, taking local path");
                        metrics::counter!(telemetry::FALLBACKS_TOTAL, "reason" => "offline")
                            .increment(1);
                        Phase::LocalPath
                    }
                }
                Phase::RemoteAttempt => self.remote_attempt(&request).await,
                Phase::LocalPath => Phase::Done(self.local_path(&request).await?),
                Phase::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn remote_attempt(&self, request: &InferRequest) -> Phase {
        // Fresh idempotency token per attempt: a retried capture is a new
        // decision, but transport-level retries inside this attempt replay
        // safely.
        let idem_token = Uuid::new_v4().to_string();
        let attempt = self.remote.infer(request, &idem_token);
        match tokio::time::timeout(self.config.remote_deadline, attempt).await {
            Ok(Ok(response)) => Phase::Done(CaptureOutcome {
                payload: response.payload,
                confidence: response.confidence,
                source: ResultSource::Remote,
                cache: Some(CacheMeta {
                    cache_hit: response.cache_hit,
                    ttl_seconds: response.ttl_seconds,
                    request_id: response.request_id,
                }),
            }),
            Ok(Err(e)) => {
                warn!(operation = %request.operation, error = %e,
                    "remote attempt failed, falling back to local model");
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "reason" => "error").increment(1);
                Phase::LocalPath
            }
            Err(_) => {
                warn!(operation = %request.operation,
                    deadline_ms = self.config.remote_deadline.as_millis() as u64,
                    "remote attempt exceeded deadline, falling back to local model");
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "reason" => "deadline").increment(1);
                Phase::LocalPath
            }
        }
    }

    async fn local_path(&self, request: &InferRequest) -> Result<CaptureOutcome> {
        let budget = self.config.local_timeout;
        let attempt = self
            .local
            .infer(request.operation, &request.image_url, &request.params, budget);
        match tokio::time::timeout(budget, attempt).await {
            Ok(Ok(inference)) if !inference.is_empty() => Ok(CaptureOutcome {
                payload: inference.payload,
                confidence: inference.confidence,
                source: ResultSource::Local,
                cache: None,
            }),
            Ok(Ok(_)) => Err(MuninnError::EmptyResult),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MuninnError::InferenceTimeout),
        }
    }
}
