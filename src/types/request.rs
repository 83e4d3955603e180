//! Inference request wire type.

use serde::{Deserialize, Serialize};

use super::{Operation, OperationParams};

/// A single inference request as accepted by the gateway.
///
/// `image_url` is an opaque, time-bounded storage reference produced by the
/// upload flow; the gateway never fetches or inspects the bytes itself, it
/// only uses the (normalized) URL as input identity for fingerprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferRequest {
    pub operation: Operation,
    pub image_url: String,
    #[serde(default)]
    pub params: OperationParams,
}

impl InferRequest {
    pub fn new(operation: Operation, image_url: impl Into<String>) -> Self {
        Self {
            operation,
            image_url: image_url.into(),
            params: OperationParams::default(),
        }
    }

    pub fn params(mut self, params: OperationParams) -> Self {
        self.params = params;
        self
    }
}
