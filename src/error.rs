// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::attempt::AttemptStatus;

/// Errors raised by the exam core and its collaborators.
#[derive(Debug, Error)]
pub enum ExamError {
    /// Mutation attempted on an attempt that no longer accepts input.
    /// The attempt is left untouched.
    #[error("attempt is already {status}")]
    InvalidStateTransition { status: AttemptStatus },

    #[error("{0} not found")]
    NotFound(String),

    #[error("attempt {attempt_id} for this exam is still in progress")]
    ConcurrentAttemptConflict { attempt_id: Uuid },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Compare-and-swap on the stored version failed.
    #[error("attempt {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ExamError {
    fn from(err: sqlx::Error) -> Self {
        ExamError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ExamError {
    fn from(err: serde_json::Error) -> Self {
        ExamError::Storage(err.to_string())
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict
    #[error("conflict: {0}")]
    Conflict(String),

    // 409 Conflict, carrying the attempt's current status
    #[error("invalid state: {message}")]
    InvalidState {
        status: AttemptStatus,
        message: String,
    },
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::InvalidState { status, message } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "status": status }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ExamError> for AppError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::InvalidStateTransition { status } => AppError::InvalidState {
                status,
                message: err.to_string(),
            },
            ExamError::NotFound(_) => AppError::NotFound(err.to_string()),
            ExamError::ConcurrentAttemptConflict { .. } | ExamError::Conflict(_) => {
                AppError::Conflict(err.to_string())
            }
            ExamError::InvalidSelection(_) => AppError::BadRequest(err.to_string()),
            ExamError::Storage(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
