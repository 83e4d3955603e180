//! Muninn error types

use std::time::Duration;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Admission errors
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Transient contention: the dedup lock stayed busy past the request
    /// budget, or an idempotent request was still in flight past the grace
    /// period. The caller should retry with backoff and jitter.
    #[error("transient contention, retry after {retry_after:?}")]
    Retryable { retry_after: Option<Duration> },

    // Inference errors
    #[error("inference exceeded its deadline")]
    InferenceTimeout,

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("empty result from model")]
    EmptyResult,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Infrastructure degradation. Never fatal for a request: the gateway
    // treats these as a forced cache miss / no-dedup path.
    #[error("result cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("dedup lock unavailable: {0}")]
    LockUnavailable(String),

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Job errors
    #[error("job not found: {0}")]
    JobNotFound(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Whether this error is transient and worth retrying.
    ///
    /// Transient: rate limiting, contention, model timeouts, degraded
    /// infrastructure. Permanent: invalid input, unknown jobs, model and
    /// configuration failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MuninnError::RateLimited { .. }
                | MuninnError::Retryable { .. }
                | MuninnError::InferenceTimeout
                | MuninnError::CacheUnavailable(_)
                | MuninnError::LockUnavailable(_)
        )
    }

    /// Extract the retry-after hint, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MuninnError::RateLimited { retry_after } => *retry_after,
            MuninnError::Retryable { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status class for the wire contract.
    ///
    /// 429 rate-limited, 503 retryable contention or degraded backend,
    /// 504 model timeout, 422 invalid input, 404 unknown job,
    /// 500 everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            MuninnError::RateLimited { .. } => 429,
            MuninnError::Retryable { .. }
            | MuninnError::CacheUnavailable(_)
            | MuninnError::LockUnavailable(_) => 503,
            MuninnError::InferenceTimeout => 504,
            MuninnError::InvalidInput(_) => 422,
            MuninnError::JobNotFound(_) => 404,
            MuninnError::Api { status, .. } => *status,
            MuninnError::InferenceFailed(_)
            | MuninnError::EmptyResult
            | MuninnError::Http(_)
            | MuninnError::Json(_)
            | MuninnError::Configuration(_) => 500,
        }
    }
}

/// Result type alias for muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
