//! Tests for the error taxonomy: transience, retry hints, status mapping.

use std::time::Duration;

use muninn::MuninnError;

// ============================================================================
// Transience classification
// ============================================================================

#[test]
fn rate_limited_is_transient() {
    let err = MuninnError::RateLimited {
        retry_after: Some(Duration::from_secs(5)),
    };
    assert!(err.is_transient());
}

#[test]
fn retryable_is_transient() {
    assert!(MuninnError::Retryable { retry_after: None }.is_transient());
}

#[test]
fn timeout_is_transient() {
    assert!(MuninnError::InferenceTimeout.is_transient());
}

#[test]
fn degraded_backends_are_transient() {
    assert!(MuninnError::CacheUnavailable("down".into()).is_transient());
    assert!(MuninnError::LockUnavailable("down".into()).is_transient());
}

#[test]
fn invalid_input_is_permanent() {
    assert!(!MuninnError::InvalidInput("bad url".into()).is_transient());
}

#[test]
fn inference_failure_is_permanent() {
    assert!(!MuninnError::InferenceFailed("model exploded".into()).is_transient());
    assert!(!MuninnError::EmptyResult.is_transient());
}

#[test]
fn configuration_is_permanent() {
    assert!(!MuninnError::Configuration("missing endpoint".into()).is_transient());
}

// ============================================================================
// retry_after extraction
// ============================================================================

#[test]
fn retry_after_from_rate_limited() {
    let duration = Duration::from_secs(5);
    let err = MuninnError::RateLimited {
        retry_after: Some(duration),
    };
    assert_eq!(err.retry_after(), Some(duration));
}

#[test]
fn retry_after_from_retryable() {
    let duration = Duration::from_millis(200);
    let err = MuninnError::Retryable {
        retry_after: Some(duration),
    };
    assert_eq!(err.retry_after(), Some(duration));
}

#[test]
fn retry_after_none_when_not_specified() {
    let err = MuninnError::RateLimited { retry_after: None };
    assert_eq!(err.retry_after(), None);
}

#[test]
fn retry_after_none_for_other_errors() {
    assert_eq!(MuninnError::InferenceTimeout.retry_after(), None);
    assert_eq!(MuninnError::Http("timeout".into()).retry_after(), None);
}

// ============================================================================
// HTTP status mapping
// ============================================================================

#[test]
fn status_codes_follow_the_wire_contract() {
    assert_eq!(
        MuninnError::RateLimited { retry_after: None }.status_code(),
        429
    );
    assert_eq!(MuninnError::Retryable { retry_after: None }.status_code(), 503);
    assert_eq!(MuninnError::InferenceTimeout.status_code(), 504);
    assert_eq!(MuninnError::InvalidInput("x".into()).status_code(), 422);
    assert_eq!(MuninnError::InferenceFailed("x".into()).status_code(), 500);
    assert_eq!(MuninnError::JobNotFound("j".into()).status_code(), 404);
    assert_eq!(MuninnError::CacheUnavailable("x".into()).status_code(), 503);
}

#[test]
fn api_error_passes_through_status() {
    let err = MuninnError::Api {
        status: 418,
        message: "teapot".into(),
    };
    assert_eq!(err.status_code(), 418);
}
