//! Request DTOs for the admin API
//!
//! Defines query strings and bodies accepted by the HTTP handlers.

use std::time::Duration;

use serde::Deserialize;

use crate::fetch::FetchConfig;

/// Longest endpoint the admin API forwards to the origin.
const MAX_ENDPOINT_LEN: usize = 2048;

/// Query string for GET /fetch and GET /text
///
/// # Fields
/// - `endpoint`: Origin endpoint, path plus optional query
/// - `force`: Bypass the cache and coalescing
/// - `ttl`: Optional TTL in milliseconds for the written entry
#[derive(Debug, Clone, Deserialize)]
pub struct FetchQuery {
    /// Origin endpoint
    pub endpoint: String,
    /// Force a network fetch
    #[serde(default)]
    pub force: bool,
    /// Optional TTL in milliseconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl FetchQuery {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.endpoint.trim().is_empty() {
            return Some("Endpoint cannot be empty".to_string());
        }
        if self.endpoint.len() > MAX_ENDPOINT_LEN {
            return Some(format!(
                "Endpoint exceeds maximum length of {} characters",
                MAX_ENDPOINT_LEN
            ));
        }
        if self.endpoint.contains("://") {
            return Some("Endpoint must be relative to the origin".to_string());
        }
        None
    }

    /// Fetch options described by the query.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            ttl: self.ttl.map(Duration::from_millis),
            version: None,
            force_refresh: self.force,
        }
    }
}

/// Query string for DELETE /cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateQuery {
    /// Substring of the keys to remove; everything when absent
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Request body for PUT /version
#[derive(Debug, Clone, Deserialize)]
pub struct VersionRequest {
    /// The new current version
    pub version: String,
}

impl VersionRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.version.trim().is_empty() {
            return Some("Version cannot be empty".to_string());
        }
        None
    }
}
