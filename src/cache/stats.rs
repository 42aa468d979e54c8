//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads answered by a valid entry
    pub hits: u64,
    /// Reads that found nothing valid
    pub misses: u64,
    /// Failed fetches answered by an expired entry
    pub stale_hits: u64,
    /// Callers that joined an in-flight retrieval
    pub coalesced: u64,
    /// Entries removed by the eviction policy
    pub evictions: u64,
    /// Writes dropped because storage stayed full after eviction
    pub dropped_writes: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current serialized size of all entries in bytes
    pub size_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Recording ==
    /// Records a read answered by a valid entry.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Records a read that found nothing valid.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records a failed fetch answered by a stored entry.
    pub fn record_stale_hit(&mut self) {
        self.stale_hits += 1;
    }

    /// Records a caller joining an in-flight retrieval.
    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    /// Records `count` entries removed by eviction.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    /// Records a write dropped because storage stayed full.
    pub fn record_dropped_write(&mut self) {
        self.dropped_writes += 1;
    }
}
