//! Error types for the aggregation layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Market Error Enum ==
/// Unified error type for the cache and aggregation layer.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Key parameters could not be canonicalized
    #[error("Invalid key input: {0}")]
    InvalidKeyInput(String),

    /// Remote cache is unreachable
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Underlying listing fetch failed
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cached payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for MarketError {
    fn from(err: redis::RedisError) -> Self {
        MarketError::Connection(err.to_string())
    }
}

impl From<reqwest::Error> for MarketError {
    fn from(err: reqwest::Error) -> Self {
        MarketError::DataSource(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketError::InvalidKeyInput(_) => StatusCode::BAD_REQUEST,
            MarketError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MarketError::DataSource(_) => StatusCode::BAD_GATEWAY,
            MarketError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            MarketError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MarketError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the aggregation layer.
pub type Result<T> = std::result::Result<T, MarketError>;
