//! Maps the per-crate error taxonomy to HTTP status codes and a
//! machine-readable `code` field, per §7's propagation policy: no internal
//! error is allowed to cross the client boundary as an opaque stack trace.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use healthmind_gateway::GatewayError;
use healthmind_ingest::IngestError;
use healthmind_orchestrator::OrchestratorError;
use healthmind_store::StoreError;

/// A transport-visible error: an HTTP status plus a machine-readable code
/// and human-readable message, serialized as `{"error": code, "detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self { status, code, detail: detail.into() }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.code, "detail": self.detail }))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::new(StatusCode::NOT_FOUND, "not_found", format!("{entity} not found: {id}"))
            }
            StoreError::Conflict(detail) => Self::new(StatusCode::CONFLICT, "conflict", detail),
            StoreError::InvalidArgument(detail) => Self::invalid_argument(detail),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        if err.is_conflict() {
            Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
        } else if err.is_not_found() {
            Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
        } else {
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::OcrUnreachable(_) | IngestError::Gateway(GatewayError::ConnectionFailed(_)) => {
                Self::new(StatusCode::BAD_GATEWAY, "upstream_unreachable", err.to_string())
            }
            IngestError::Timeout { .. } | IngestError::Gateway(GatewayError::Timeout) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", err.to_string())
            }
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", other.to_string()),
        }
    }
}
