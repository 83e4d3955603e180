//! HTTP surface for the inference gateway.
//!
//! Wire contract: `POST /v1/infer/{operation}` for synchronous inference,
//! `POST /v1/jobs` + `GET /v1/jobs/{job_id}` for the async variant, and
//! `GET /healthz`. Caller identity is the opaque bearer subject from the
//! `Authorization` header (token issuance and verification happen
//! upstream); the idempotency token rides in the `idempotency-key` header.
//! Typed errors map to HTTP status classes via
//! [`MuninnError::status_code`], with a `retry-after` header where the
//! error carries a hint.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::gateway::InferenceGateway;
use crate::types::{InferRequest, InferResponse, JobRecord, JobTicket, Operation, OperationParams};
use crate::{MuninnError, Result};

/// Build the gateway router.
pub fn router(gateway: InferenceGateway) -> Router {
    Router::new()
        .route("/v1/infer/{operation}", post(infer))
        .route("/v1/jobs", post(create_job))
        .route("/v1/jobs/{job_id}", get(get_job))
        .route("/healthz", get(healthz))
        .with_state(gateway)
}

/// Bind `address` and serve until ctrl-c.
pub async fn serve(gateway: InferenceGateway, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| MuninnError::Configuration(format!("failed to bind {address}: {e}")))?;
    info!(address, "muninnd listening");
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| MuninnError::Http(e.to_string()))
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Request body for synchronous inference.
#[derive(Debug, Deserialize)]
struct InferBody {
    image_url: String,
    #[serde(default)]
    params: OperationParams,
}

/// Request body for job creation.
#[derive(Debug, Deserialize)]
struct JobBody {
    operation: Operation,
    image_url: String,
    #[serde(default)]
    params: OperationParams,
}

async fn infer(
    State(gateway): State<InferenceGateway>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InferBody>,
) -> ApiResult<Json<InferResponse>> {
    let operation = Operation::parse(&operation)?;
    let request = InferRequest {
        operation,
        image_url: body.image_url,
        params: body.params,
    };
    let identity = caller_identity(&headers);
    let idem_token = idempotency_token(&headers);
    let response = gateway
        .infer(request, &identity, idem_token.as_deref())
        .await?;
    Ok(Json(response))
}

async fn create_job(
    State(gateway): State<InferenceGateway>,
    headers: HeaderMap,
    Json(body): Json<JobBody>,
) -> ApiResult<(StatusCode, Json<JobTicket>)> {
    let request = InferRequest {
        operation: body.operation,
        image_url: body.image_url,
        params: body.params,
    };
    let identity = caller_identity(&headers);
    let ticket = gateway.create_job(request, &identity).await?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

async fn get_job(
    State(gateway): State<InferenceGateway>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    Ok(Json(gateway.job(&job_id).await?))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Opaque caller subject from the `Authorization` header.
///
/// Authentication happens upstream; by the time a request reaches the
/// gateway the bearer value is a verified opaque subject, used only as the
/// rate-limit and audit key.
fn caller_identity(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

fn idempotency_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Wrapper giving [`MuninnError`] an HTTP rendering.
struct ApiError(MuninnError);

impl From<MuninnError> for ApiError {
    fn from(err: MuninnError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = self.0.retry_after();
        let body = Json(serde_json::json!({
            "error": error_label(&self.0),
            "message": self.0.to_string(),
            "retry_after_seconds": retry_after.map(|d| d.as_secs().max(1)),
        }));
        let mut response = (status, body).into_response();
        if let Some(d) = retry_after
            && let Ok(value) = HeaderValue::from_str(&d.as_secs().max(1).to_string())
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

fn error_label(err: &MuninnError) -> &'static str {
    match err {
        MuninnError::RateLimited { .. } => "rate_limited",
        MuninnError::Retryable { .. } => "retryable",
        MuninnError::InferenceTimeout => "inference_timeout",
        MuninnError::InferenceFailed(_) => "inference_failed",
        MuninnError::EmptyResult => "empty_result",
        MuninnError::InvalidInput(_) => "invalid_input",
        MuninnError::CacheUnavailable(_) => "cache_unavailable",
        MuninnError::LockUnavailable(_) => "lock_unavailable",
        MuninnError::Http(_) => "http",
        MuninnError::Api { .. } => "api",
        MuninnError::Json(_) => "json",
        MuninnError::JobNotFound(_) => "job_not_found",
        MuninnError::Configuration(_) => "configuration",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_subject_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer user-123".parse().unwrap());
        assert_eq!(caller_identity(&headers), "user-123");
    }

    #[test]
    fn missing_auth_is_anonymous() {
        assert_eq!(caller_identity(&HeaderMap::new()), "anonymous");
    }

    #[test]
    fn blank_idempotency_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("idempotency-key", "  ".parse().unwrap());
        assert_eq!(idempotency_token(&headers), None);
        headers.insert("idempotency-key", "tok-1".parse().unwrap());
        assert_eq!(idempotency_token(&headers).as_deref(), Some("tok-1"));
    }
}
