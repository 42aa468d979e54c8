//! Eviction Policy Module
//!
//! Oldest-written-first reclamation under a byte budget.
//!
//! Entries are ordered by write timestamp, not by last read, so this is an
//! approximation of LRU: a frequently read but early written entry goes first.

// == Eviction Candidate ==
/// What the policy needs to know about one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    /// Namespaced storage key
    pub key: String,
    /// Write timestamp (Unix milliseconds), 0 for unparsable entries
    pub timestamp: u64,
    /// Serialized length in bytes
    pub size: usize,
}

// == Eviction Policy ==
/// Byte budget and the usage level eviction brings the store down to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    /// Maximum bytes for all entries
    pub max_bytes: usize,
    /// Fraction of `max_bytes` to shrink to once eviction runs
    pub cleanup_threshold: f64,
}

impl EvictionPolicy {
    /// Creates a policy with the given budget and threshold.
    pub fn new(max_bytes: usize, cleanup_threshold: f64) -> Self {
        Self {
            max_bytes,
            cleanup_threshold: cleanup_threshold.clamp(0.0, 1.0),
        }
    }

    /// Usage eviction aims for.
    pub fn target_bytes(&self) -> usize {
        (self.max_bytes as f64 * self.cleanup_threshold) as usize
    }

    /// Returns true if writing `incoming` more bytes would exceed the budget.
    pub fn needs_eviction(&self, used: usize, incoming: usize) -> bool {
        used.saturating_add(incoming) > self.max_bytes
    }

    /// Bytes to reclaim so that `used + incoming` fits the target.
    pub fn reclaim_for_write(&self, used: usize, incoming: usize) -> usize {
        used.saturating_add(incoming).saturating_sub(self.target_bytes())
    }

    /// Bytes to reclaim after the medium rejected a write of `incoming` bytes.
    ///
    /// The medium may be smaller than the budget, so this frees at least the
    /// headroom between budget and target regardless of current usage.
    pub fn reclaim_on_quota(&self, incoming: usize) -> usize {
        incoming.max(self.max_bytes - self.target_bytes())
    }

    /// Chooses the keys to remove, oldest first.
    ///
    /// Candidates are sorted by `(timestamp, key)` and taken until at least
    /// `reclaim` bytes are freed, or none are left.
    pub fn plan(&self, mut candidates: Vec<EvictionCandidate>, reclaim: usize) -> Vec<String> {
        candidates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));

        let mut reclaimed = 0;
        let mut victims = Vec::new();

        for candidate in candidates {
            if reclaimed >= reclaim {
                break;
            }
            reclaimed += candidate.size;
            victims.push(candidate.key);
        }

        victims
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(5 * 1024 * 1024, 0.8)
    }
}
