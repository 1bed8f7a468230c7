//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.
//!
//! Validation, configuration and capability errors always reach the caller.
//! Backend and serialization errors are absorbed by the `CacheManager` into
//! `false`/miss results.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid key, group, offset or value, raised before any substrate access
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown handler, bad options, or a driver that failed its own init
    #[error("Configuration error: {0}")]
    Config(String),

    /// The active driver has no implementation for this operation
    #[error("Operation '{operation}' is not implemented for the {driver} driver")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    /// The substrate rejected or failed the operation
    #[error("{driver} backend error: {message}")]
    Backend {
        driver: &'static str,
        message: String,
    },

    /// Stored payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Wraps any displayable substrate failure.
    pub fn backend(driver: &'static str, err: impl std::fmt::Display) -> Self {
        CacheError::Backend {
            driver,
            message: err.to_string(),
        }
    }

    /// True for failures the facade turns into `false`/default results.
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            CacheError::Backend { .. } | CacheError::Serialization(_)
        )
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            CacheError::Backend { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
