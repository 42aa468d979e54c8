//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the origin serving the cached resources
    pub origin_url: String,
    /// Directory holding the persisted cache document
    pub cache_dir: PathBuf,
    /// Prefix applied to every entry key in the storage medium
    pub namespace: String,
    /// Byte budget for all entries under the namespace
    pub max_cache_bytes: usize,
    /// Fraction of the budget eviction brings usage down to
    pub cleanup_threshold: f64,
    /// TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Origin endpoint returning `{ "version": "..." }`
    pub version_endpoint: String,
    /// TTL in milliseconds for the initial version lookup
    pub version_ttl_ms: u64,
    /// Version polling interval in seconds
    pub sync_interval: u64,
    /// Admin HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ORIGIN_URL` - Origin base URL (default: http://localhost:3001)
    /// - `CACHE_DIR` - Persistence directory (default: .origin_cache)
    /// - `CACHE_NAMESPACE` - Entry key prefix (default: origin_cache_)
    /// - `MAX_CACHE_BYTES` - Byte budget (default: 5 MiB)
    /// - `CLEANUP_THRESHOLD` - Eviction target fraction (default: 0.8)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `VERSION_ENDPOINT` - Version endpoint path (default: cache-version)
    /// - `VERSION_TTL_MS` - TTL of the initial version lookup (default: 5000)
    /// - `SYNC_INTERVAL` - Version polling interval in seconds (default: 30)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            max_cache_bytes: parse_var("MAX_CACHE_BYTES").unwrap_or(defaults.max_cache_bytes),
            cleanup_threshold: parse_var("CLEANUP_THRESHOLD")
                .filter(|t: &f64| *t > 0.0 && *t <= 1.0)
                .unwrap_or(defaults.cleanup_threshold),
            default_ttl_ms: parse_var("DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl_ms),
            version_endpoint: env::var("VERSION_ENDPOINT").unwrap_or(defaults.version_endpoint),
            version_ttl_ms: parse_var("VERSION_TTL_MS").unwrap_or(defaults.version_ttl_ms),
            sync_interval: parse_var("SYNC_INTERVAL")
                .filter(|s: &u64| *s > 0)
                .unwrap_or(defaults.sync_interval),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Version polling interval as a `Duration`.
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin_url: "http://localhost:3001".to_string(),
            cache_dir: PathBuf::from(".origin_cache"),
            namespace: "origin_cache_".to_string(),
            max_cache_bytes: 5 * 1024 * 1024,
            cleanup_threshold: 0.8,
            default_ttl_ms: 5 * 60 * 1000,
            version_endpoint: "cache-version".to_string(),
            version_ttl_ms: 5_000,
            sync_interval: 30,
            server_port: 3000,
        }
    }
}
