//! Model collaborator boundary.
//!
//! The gateway treats every model — OCR engine, detector, captioner,
//! multimodal LLM — as a replaceable black box behind [`InferenceModel`]:
//! `infer(input, params, deadline) -> (payload, confidence)`. Models must
//! be side-effect-free beyond producing the result; all caching, dedup and
//! replay happen above this boundary. The same trait serves as the
//! client-side degraded local model.

mod http;

pub use http::{HttpModel, HttpModelConfig};

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Inference, Operation, OperationParams};

/// A single inference backend.
///
/// `deadline` is the hard budget for this invocation; the caller also
/// enforces it externally, so an implementation that overruns is cut off
/// either way. Implementations report failures as `InferenceFailed` and
/// their own deadline handling as `InferenceTimeout`.
#[async_trait]
pub trait InferenceModel: Send + Sync {
    /// Human-readable backend name for logs and metrics.
    fn name(&self) -> &str;

    async fn infer(
        &self,
        operation: Operation,
        image_url: &str,
        params: &OperationParams,
        deadline: Duration,
    ) -> Result<Inference>;
}
