//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Counters and usage of the store
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Retrievals currently in flight
    pub pending_requests: usize,
    /// Version entries are validated against
    pub current_version: String,
    /// Last version token seen by the monitor
    pub last_known_version: Option<String>,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(
        stats: CacheStats,
        pending_requests: usize,
        current_version: impl Into<String>,
        last_known_version: Option<String>,
    ) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
            pending_requests,
            current_version: current_version.into(),
            last_known_version,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Summary message
    pub message: String,
    /// Number of entries removed
    pub removed: usize,
}

impl InvalidateResponse {
    /// Creates a new InvalidateResponse
    pub fn new(pattern: Option<&str>, removed: usize) -> Self {
        let message = match pattern {
            Some(pattern) => format!("Removed {} entries matching '{}'", removed, pattern),
            None => format!("Removed {} entries", removed),
        };
        Self { message, removed }
    }
}

/// Response body for PUT /version and POST /version/check
#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    /// Current cache version
    pub version: String,
    /// Whether the cache was invalidated
    pub changed: bool,
    /// Last version token seen by the monitor
    pub last_known_version: Option<String>,
}

impl VersionResponse {
    /// Creates a new VersionResponse
    pub fn new(
        version: impl Into<String>,
        changed: bool,
        last_known_version: Option<String>,
    ) -> Self {
        Self {
            version: version.into(),
            changed,
            last_known_version,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
