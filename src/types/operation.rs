//! Inference operation types and their parameters.

use serde::{Deserialize, Serialize};

use crate::{MuninnError, Result};

/// The inference operations the gateway can execute.
///
/// Each operation maps to one model collaborator behind the gateway and
/// carries its own timeout and cache ttl (see [`GatewayConfig`](crate::config::GatewayConfig)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Text extraction from a photographed document or sign.
    Ocr,
    /// Object detection with per-object labels and boxes.
    ObjectDetection,
    /// Natural-language description of the whole scene.
    SceneCaption,
    /// Visual question answering against a user prompt.
    MultimodalQuery,
}

impl Operation {
    /// Stable name used in store keys, URL paths, and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ocr => "ocr",
            Operation::ObjectDetection => "object_detection",
            Operation::SceneCaption => "scene_caption",
            Operation::MultimodalQuery => "multimodal_query",
        }
    }

    /// Parse an operation from its stable name (inverse of [`as_str`](Self::as_str)).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ocr" => Ok(Operation::Ocr),
            "object_detection" => Ok(Operation::ObjectDetection),
            "scene_caption" => Ok(Operation::SceneCaption),
            "multimodal_query" => Ok(Operation::MultimodalQuery),
            other => Err(MuninnError::InvalidInput(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-specific parameters.
///
/// A flat bag rather than per-operation structs so the wire shape stays
/// stable; [`validate_for`](Self::validate_for) enforces which fields an
/// operation requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationParams {
    /// OCR language hint, e.g. "en" or "de".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Minimum confidence for reported detections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f32>,

    /// Caption detail level, e.g. "brief" or "detailed".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// User question for multimodal queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl OperationParams {
    /// Check that the parameters required by `operation` are present.
    pub fn validate_for(&self, operation: Operation) -> Result<()> {
        if operation == Operation::MultimodalQuery
            && self.prompt.as_deref().is_none_or(str::is_empty)
        {
            return Err(MuninnError::InvalidInput(
                "multimodal_query requires a prompt".into(),
            ));
        }
        Ok(())
    }

    /// Deterministic encoding for fingerprinting.
    ///
    /// Fixed field order, absent fields elided, so identical parameters
    /// always produce identical bytes regardless of wire-level field order.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if let Some(ref locale) = self.locale {
            out.push_str("locale=");
            out.push_str(locale);
            out.push(';');
        }
        if let Some(threshold) = self.confidence_threshold {
            out.push_str(&format!("confidence_threshold={threshold};"));
        }
        if let Some(ref detail) = self.detail {
            out.push_str("detail=");
            out.push_str(detail);
            out.push(';');
        }
        if let Some(ref prompt) = self.prompt {
            out.push_str("prompt=");
            out.push_str(prompt);
            out.push(';');
        }
        out
    }
}
