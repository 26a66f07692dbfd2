//! Error types for the cache
//!
//! Provides unified error handling using thiserror. The public cache
//! operations absorb these internally; they only cross the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache (or expired)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Value could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Payload could not be compressed or decompressed
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Persistence backend or queue failure
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Filesystem error from the file backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded database error from the sqlite backend
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Compression(_)
            | CacheError::Persistence(_)
            | CacheError::Io(_)
            | CacheError::Sqlite(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
