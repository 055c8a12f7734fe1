//! Response DTOs for the marketplace API
//!
//! Listing pages and stats are returned as their market types; the bodies
//! below cover health, invalidation and errors.

use serde::Serialize;

use crate::cache::{CacheInfo, ConnectionState};

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` while the cache is connected, `degraded` otherwise
    pub status: String,
    pub cache: CacheInfo,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_cache(cache: CacheInfo) -> Self {
        let status = if cache.state == ConnectionState::Connected {
            "healthy"
        } else {
            "degraded"
        };

        Self {
            status: status.to_string(),
            cache,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for DELETE /listings/cache
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Number of cached entries that were removed
    pub invalidated: usize,
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
