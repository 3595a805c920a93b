//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror. None of these errors
//! ever reach the caller of a wrapped business operation: the coordinator
//! degrades them to cache misses or no-ops. They surface only through the
//! admin API and the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache subsystem.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Namespace contains characters outside `[A-Za-z0-9_.-]`
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Distributed store unreachable or returned an error
    #[error("Tier unavailable: {0}")]
    TierUnavailable(String),

    /// Distributed call exceeded its timeout
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalidation bus publish/subscribe failure
    #[error("Invalidation bus error: {0}")]
    Bus(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::TierUnavailable(e.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidNamespace(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::TierUnavailable(_) | CacheError::Timeout(_) | CacheError::Bus(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Serialization(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;
