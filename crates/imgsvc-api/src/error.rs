//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`PipelineError`] kinds to HTTP status codes and returns JSON
//! bodies with an error code and message. Messages of 500-class errors are
//! logged and replaced before they reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imgsvc_core::{PipelineError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request, config, or payload (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Upload payload exceeds the configured limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown image or ticket (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Upload ticket expired or already used (410).
    #[error("gone: {0}")]
    Gone(String),

    /// The image could not be transformed (422).
    #[error("unprocessable image: {0}")]
    Unprocessable(String),

    /// A store or the index is temporarily unavailable (503).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The invocation budget ran out (504).
    #[error("timed out: {0}")]
    TimedOut(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Gone(_) => (StatusCode::GONE, "TICKET_EXPIRED"),
            Self::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "TRANSFORM_FAILED"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::TimedOut(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMED_OUT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::TimedOut(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Unavailable(_) => "Storage is temporarily unavailable; retry later".to_string(),
            Self::TimedOut(_) => "The request did not complete in time; retry later".to_string(),
            other => other.to_string(),
        };

        if self.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::PayloadTooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(v) => v.into(),
            PipelineError::NotFound(what) => Self::NotFound(what),
            PipelineError::TicketExpired(what) => Self::Gone(what),
            PipelineError::Transform(reason) => Self::Unprocessable(reason),
            PipelineError::ConsistencyFault(reason) => Self::Internal(reason),
            PipelineError::TransientStore(reason) => Self::Unavailable(reason),
            PipelineError::TimedOut(budget) => Self::TimedOut(format!("budget {budget:?} exceeded")),
        }
    }
}
