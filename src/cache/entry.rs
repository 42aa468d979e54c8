//! Cache Entry Module
//!
//! Defines the persisted envelope around a payload and the validity rule.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A payload together with the metadata that decides its freshness.
///
/// Serializes as `{"data":..,"timestamp":..,"version":"..","expiry":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub data: T,
    /// Write time (Unix milliseconds)
    pub timestamp: u64,
    /// Version tag current at write time
    pub version: String,
    /// Time to live (milliseconds)
    pub expiry: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `data` - The payload to wrap
    /// * `version` - Version tag the entry belongs to
    /// * `ttl` - Time to live
    pub fn new(data: T, version: impl Into<String>, ttl: Duration) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            version: version.into(),
            expiry: ttl.as_millis() as u64,
        }
    }

    // == Validity ==
    /// Checks the entry against `current_version` at time `now_ms`.
    ///
    /// Valid iff `timestamp + expiry > now_ms` and the version tags match.
    /// Once `now_ms >= timestamp + expiry` the entry is invalid regardless of version.
    pub fn is_valid_at(&self, current_version: &str, now_ms: u64) -> bool {
        self.expires_at() > now_ms && self.version == current_version
    }

    /// Checks the entry against `current_version` at the current time.
    pub fn is_valid(&self, current_version: &str) -> bool {
        self.is_valid_at(current_version, current_timestamp_ms())
    }

    /// Expiration timestamp (Unix milliseconds).
    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(self.expiry)
    }

    /// Remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at().saturating_sub(current_timestamp_ms())
    }

    /// Write time as a UTC datetime.
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp as i64).single()
    }

    /// Maps the payload, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            timestamp: self.timestamp,
            version: self.version,
            expiry: self.expiry,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
