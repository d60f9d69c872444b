//! Error taxonomy for the store and the intake operations, plus the HTTP mapping.
//!
//! - `StoreError`: anything the record store can fail with.
//! - `Error`: what operations surface to callers. Commit-phase failures are
//!   wrapped in `Error::Transaction` so the caller never sees a partial response id.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored JSON column could not be encoded or decoded: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock was poisoned")]
    Poisoned,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("question {0} was not found")]
    QuestionNotFound(String),

    #[error("response {0} was not found")]
    ResponseNotFound(String),

    #[error("invalid or used token")]
    InvalidToken,

    #[error("submission could not be committed")]
    Transaction(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::QuestionNotFound(_) => (StatusCode::NOT_FOUND, "Question not found".to_string()),
            Self::ResponseNotFound(_) => (StatusCode::NOT_FOUND, "Response not found".to_string()),
            Self::InvalidToken => (StatusCode::BAD_REQUEST, "Invalid or used token".to_string()),
            Self::Transaction(source) => {
                error!(target: "survey_backend", error = %source, "Submission rolled back");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::Store(source) => {
                error!(target: "survey_backend", error = %source, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::Join(source) => {
                error!(target: "survey_backend", error = %source, "Blocking task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
