//! Error types and HTTP error response handling.
//!
//! This module defines the application-level errors: `AppError` for HTTP
//! handlers and `JobError` for queue handlers. Storage and queue backends
//! define their own errors (`StoreError`, `QueueError`) which convert into
//! both.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::queue::QueueError;
use crate::store::StoreError;

/// Application-wide error type for HTTP handlers.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Infrastructure Errors**: store or queue failures (500)
/// - **Authentication Errors**: invalid or missing API keys (401)
/// - **Resource Errors**: requested resources not found (404)
/// - **Validation Errors**: invalid request data or state (400)
/// - **Concurrency Errors**: a request with the same idempotency key is in flight (409)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Store operation failed (e.g., connection error, query error).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Job could not be enqueued.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// API key is missing or unknown.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Requested resource does not exist or belongs to another merchant.
    ///
    /// Returns HTTP 404 Not Found. The String names the resource.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body, parameters or resource state are invalid.
    ///
    /// Returns HTTP 400 Bad Request with code `BAD_REQUEST_ERROR`.
    #[error("{0}")]
    BadRequest(String),

    /// Another request holding the same idempotency key did not finish in time.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure outside the store and queue.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed JSON bodies surface as `BAD_REQUEST_ERROR`.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "BAD_REQUEST_ERROR",
///     "description": "Refund amount exceeds available amount"
///   }
/// }
/// ```
///
/// Infrastructure errors are logged and hidden behind a generic description.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, description) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_ERROR",
                self.to_string(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND_ERROR", self.to_string()),
            AppError::BadRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST_ERROR", msg.clone())
            }
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "CONFLICT_ERROR", msg.clone()),
            AppError::Store(_) | AppError::Queue(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "description": description
            }
        }));

        (status, body).into_response()
    }
}

/// Failure of a queue job handler.
///
/// A job whose handler returns an error is marked `failed` and is not
/// redelivered.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The record referenced by the job does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Job payload could not be decoded or an event could not be encoded.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl JobError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        JobError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
