//! # Web API Error Types
//!
//! HTTP-facing errors and their response conversion. Every error body has the
//! shape `{"error": {"code": ..., "message": ...}}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::BulkgenError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    /// The request conflicts with the current state of the resource
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Circuit breaker is open for {component}")]
    CircuitBreakerOpen { component: String },

    #[error("Invalid UUID format: {uuid}")]
    InvalidUuid { uuid: String },

    /// Details are logged, never returned
    #[error("Internal server error: {details}")]
    Internal { details: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_uuid(uuid: impl Into<String>) -> Self {
        Self::InvalidUuid { uuid: uuid.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::InvalidUuid { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::CircuitBreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let (error_code, message) = match &self {
            ApiError::NotFound { message } => ("NOT_FOUND", message.clone()),
            ApiError::BadRequest { message } => ("BAD_REQUEST", message.clone()),
            ApiError::Conflict { message } => ("CONFLICT", message.clone()),
            ApiError::CircuitBreakerOpen { component } => (
                "CIRCUIT_BREAKER_OPEN",
                format!("{component} is temporarily unavailable"),
            ),
            ApiError::InvalidUuid { uuid } => ("INVALID_UUID", format!("'{uuid}' is not a valid batch id")),
            ApiError::Internal { details } => {
                error!(details = %details, "❌ Request failed with internal error");
                ("INTERNAL_ERROR", "Internal server error".to_string())
            }
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl From<BulkgenError> for ApiError {
    fn from(err: BulkgenError) -> Self {
        match err {
            BulkgenError::ValidationError(message) => ApiError::BadRequest { message },
            BulkgenError::BatchNotFound(_) | BulkgenError::RowNotFound { .. } => {
                ApiError::not_found(err.to_string())
            }
            BulkgenError::DuplicateBatch { .. } | BulkgenError::InvalidStateTransition { .. } => {
                ApiError::Conflict {
                    message: err.to_string(),
                }
            }
            BulkgenError::CircuitOpen { component } => ApiError::CircuitBreakerOpen { component },
            BulkgenError::DispatchFailed { .. }
            | BulkgenError::StoreError(_)
            | BulkgenError::ConfigurationError(_) => ApiError::Internal {
                details: err.to_string(),
            },
        }
    }
}

/// Malformed or mistyped JSON bodies
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}
