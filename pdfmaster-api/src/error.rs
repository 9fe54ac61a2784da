use axum::{
    extract::{multipart::MultipartError, rejection::QueryRejection, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pdfmaster::ErrorClass;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message describing what went wrong
    pub error: String,
}

/// Application-specific error types for the API
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Errors raised by pdfmaster operations
    #[error(transparent)]
    Core(#[from] pdfmaster::Error),

    /// Malformed or missing request parameters
    #[error("{0}")]
    BadRequest(String),

    /// Request rejected while being read, e.g. an oversized upload
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    /// Anything unexpected in the gateway itself
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Core(e) => match e.class() {
                ErrorClass::InvalidInput | ErrorClass::DecodeFailure => StatusCode::BAD_REQUEST,
                ErrorClass::ConversionUnavailable => StatusCode::NOT_IMPLEMENTED,
                ErrorClass::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected { status, .. } => *status,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_msg = if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
            // Full detail stays in the logs
            error!("Request failed: {self}");
            "Internal server error".to_string()
        } else {
            warn!(status = status.as_u16(), "Request rejected: {self}");
            self.to_string()
        };

        (status, Json(ErrorResponse { error: error_msg })).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Rejected {
            status: err.status(),
            message: format!("Failed to read multipart form: {}", err.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Worker task failed: {err}"))
    }
}
