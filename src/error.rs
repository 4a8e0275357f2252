//! Error taxonomy
//!
//! Row-level failures are data: they are recorded against the row and the
//! batch keeps going. Only whole-file conditions abort an import. `ApiError`
//! is the HTTP edge of both.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A failure confined to a single imported row.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    /// The row has no phone cell, or the phone does not yield a `last10` key.
    #[error("no usable phone number")]
    MissingIdentity,

    /// The per-row upsert failed; the row is skipped, siblings are unaffected.
    #[error("failed to save record: {0}")]
    Persistence(String),
}

/// Whole-batch-fatal conditions: the upload itself cannot be processed.
#[derive(Debug, Error)]
pub enum ImportFileError {
    #[error("unreadable file: {0}")]
    Unreadable(String),

    #[error("file contains no data rows")]
    Empty,

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
}

/// HTTP-facing errors. Row failures never surface here; they travel inside
/// the progress stream.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request has no file upload")]
    MissingFile,

    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("not allowed")]
    Forbidden,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Database(e) => {
                tracing::error!("database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ApiError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
