//! Cache Module
//!
//! Persistent entry storage with TTL + version validity and byte-budget eviction.

mod backend;
mod entry;
mod eviction;
mod key;
mod stats;
mod store;


// Re-export public types
pub use backend::{FileBackend, MemoryBackend, StorageBackend, STORE_FILE_NAME};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use eviction::{EvictionCandidate, EvictionPolicy};
pub use key::{CacheKey, TEXT_KEY_PREFIX};
pub use stats::CacheStats;
pub use store::Store;

// == Public Constants ==
/// Reserved storage key holding the current version
pub const VERSION_KEY: &str = "cache_version";

/// Version assumed when none has been stored
pub const DEFAULT_VERSION: &str = "1.0.0";
