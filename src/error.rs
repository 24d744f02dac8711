use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::workflow::{Action, Status};

/// Failures raised by the workflow core. None of these are retryable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("actor is not allowed to perform this action")]
    Unauthorized,

    #[error("cannot {action} a submission in status {from}")]
    InvalidTransition { from: Status, action: Action },

    #[error("a rejection requires a comment")]
    MissingReason,

    #[error("submission not found")]
    NotFound,

    #[error("a document must be attached before finalizing")]
    MissingDocument,

    #[error("only the submitting instructor may do this")]
    NotOwner,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The row changed underneath a compare-and-set.
    #[error("submission status changed concurrently")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Workflow(e) => match e {
                WorkflowError::Unauthorized | WorkflowError::NotOwner => StatusCode::FORBIDDEN,
                WorkflowError::InvalidTransition { .. }
                | WorkflowError::MissingReason
                | WorkflowError::MissingDocument => StatusCode::BAD_REQUEST,
                WorkflowError::NotFound => StatusCode::NOT_FOUND,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            // A lost compare-and-set means the caller acted on a stale status.
            ApiError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
