//! Inference result and response types.

use serde::{Deserialize, Serialize};

/// Raw output of one model invocation: payload plus the model's own
/// confidence score. The payload shape is operation-specific (a text block
/// for OCR, a detection list for object detection, …) so it stays an
/// opaque JSON value at this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub payload: serde_json::Value,
    pub confidence: f32,
}

impl Inference {
    pub fn new(payload: serde_json::Value, confidence: f32) -> Self {
        Self {
            payload,
            confidence,
        }
    }

    /// A result with nothing in it is not worth announcing to the user.
    pub fn is_empty(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }
}

/// Gateway response for a completed inference request.
///
/// `cache_hit` distinguishes a content-cache hit from fresh execution;
/// an idempotent replay returns the stored response byte-identically,
/// including whatever `cache_hit` it originally carried. `ttl_seconds`
/// is the remaining life of the cached result so clients can reason
/// about staleness themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferResponse {
    pub payload: serde_json::Value,
    pub confidence: f32,
    pub request_id: String,
    pub cache_hit: bool,
    pub ttl_seconds: u64,
}
