//! Cache Store Module
//!
//! Namespaced entry storage combining a backend medium with the validity
//! rule, byte accounting and the eviction policy.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheKey, CacheStats, EvictionCandidate, EvictionPolicy, StorageBackend,
    DEFAULT_VERSION, VERSION_KEY,
};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Entry storage over a [`StorageBackend`].
///
/// Every entry key is prefixed with the namespace before it reaches the
/// medium. The current version lives under [`VERSION_KEY`], outside the
/// namespace, so clearing entries keeps it.
pub struct Store {
    /// Underlying medium
    backend: Box<dyn StorageBackend>,
    /// Prefix for entry keys
    namespace: String,
    /// Byte budget
    policy: EvictionPolicy,
    /// Performance statistics
    stats: CacheStats,
}

impl Store {
    // == Constructor ==
    /// Creates a store over `backend`.
    ///
    /// # Arguments
    /// * `backend` - The medium entries are written to
    /// * `namespace` - Prefix applied to every entry key
    /// * `policy` - Byte budget and eviction target
    pub fn new(
        backend: Box<dyn StorageBackend>,
        namespace: impl Into<String>,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            policy,
            stats: CacheStats::new(),
        }
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.namespace, key.as_str())
    }

    fn is_entry_key(&self, storage_key: &str) -> bool {
        storage_key != VERSION_KEY && storage_key.starts_with(&self.namespace)
    }

    fn entry_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter(|k| self.is_entry_key(k))
            .collect())
    }

    // == Version ==
    /// Returns the current version, `"1.0.0"` when none was stored.
    pub fn current_version(&self) -> String {
        match self.backend.get_item(VERSION_KEY) {
            Ok(Some(version)) => version,
            Ok(None) => DEFAULT_VERSION.to_string(),
            Err(e) => {
                warn!("Failed to read cache version, assuming default: {}", e);
                DEFAULT_VERSION.to_string()
            }
        }
    }

    /// Stores `version` as the current version without touching entries.
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        self.backend.set_item(VERSION_KEY, version)
    }

    /// Stores `version` and removes every entry.
    ///
    /// Entries are already invalid once the version changes; clearing
    /// reclaims their space immediately.
    pub fn update_version(&mut self, version: &str) -> Result<usize> {
        self.set_version(version)?;
        let removed = self.clear()?;
        info!("Cache version set to {}, {} entries cleared", version, removed);
        Ok(removed)
    }

    // == Set ==
    /// Writes an entry, evicting old entries when the budget requires it.
    ///
    /// Returns `Ok(false)` when the medium stayed full after eviction and
    /// the write was dropped. Other storage failures are returned.
    pub fn set(&mut self, key: &CacheKey, entry: &CacheEntry<Value>) -> Result<bool> {
        let serialized = serde_json::to_string(entry)?;
        let storage_key = self.storage_key(key);

        // An overwrite frees the old value first
        let replaced = self.backend.size_of(&storage_key)?;
        let used = self.size_bytes()?.saturating_sub(replaced);
        let incoming = serialized.len();
        if self.policy.needs_eviction(used, incoming) {
            let reclaim = self.policy.reclaim_for_write(used, incoming);
            self.evict_excluding(reclaim, Some(&storage_key))?;
        }

        match self.backend.set_item(&storage_key, &serialized) {
            Ok(()) => Ok(true),
            Err(CacheError::QuotaExceeded(reason)) => {
                debug!("Storage full writing {}: {}, evicting", key, reason);
                let reclaim = self.policy.reclaim_on_quota(incoming);
                self.evict_excluding(reclaim, Some(&storage_key))?;
                match self.backend.set_item(&storage_key, &serialized) {
                    Ok(()) => Ok(true),
                    Err(CacheError::QuotaExceeded(reason)) => {
                        warn!(
                            "Cache storage quota exceeded after cleanup, dropping {}: {}",
                            key, reason
                        );
                        self.stats.record_dropped_write();
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    // == Get ==
    /// Returns the entry for `key` if it is valid.
    ///
    /// Expired, outdated and corrupt entries are removed and reported as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry<Value>> {
        let version = self.current_version();
        match self.read(key) {
            Some(entry) if entry.is_valid(&version) => {
                self.stats.record_hit();
                Some(entry)
            }
            Some(_) => {
                debug!("Cache entry {} is stale, removing", key);
                if let Err(e) = self.remove(key) {
                    warn!("Failed to remove stale entry {}: {}", key, e);
                }
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns the entry for `key` if it is valid, leaving an invalid one stored.
    ///
    /// Used ahead of a refetch: the invalid entry stays available to
    /// [`Store::get_stale`] should the origin fail, and a successful fetch
    /// overwrites it.
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CacheEntry<Value>> {
        let version = self.current_version();
        match self.read(key) {
            Some(entry) if entry.is_valid(&version) => {
                self.stats.record_hit();
                Some(entry)
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns the entry for `key` regardless of expiry or version.
    pub fn get_stale(&mut self, key: &CacheKey) -> Option<CacheEntry<Value>> {
        self.read(key)
    }

    fn read(&mut self, key: &CacheKey) -> Option<CacheEntry<Value>> {
        let storage_key = self.storage_key(key);
        let raw = match self.backend.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache retrieval failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Corrupt cache entry {}, removing: {}", key, e);
                if let Err(e) = self.backend.remove_item(&storage_key) {
                    warn!("Failed to remove corrupt entry {}: {}", key, e);
                }
                None
            }
        }
    }

    // == Remove ==
    /// Removes an entry. Returns whether it existed.
    pub fn remove(&mut self, key: &CacheKey) -> Result<bool> {
        let storage_key = self.storage_key(key);
        let existed = self.backend.get_item(&storage_key)?.is_some();
        self.backend.remove_item(&storage_key)?;
        Ok(existed)
    }

    // == Clear ==
    /// Removes every entry under the namespace. Returns the number removed.
    pub fn clear(&mut self) -> Result<usize> {
        let keys = self.entry_keys()?;
        self.backend.remove_items(&keys)?;
        Ok(keys.len())
    }

    /// Removes every entry whose endpoint contains `pattern`.
    ///
    /// The pattern is matched against the endpoint as it was requested, so
    /// `category_id` matches the entry of `documents?category_id=5`.
    pub fn remove_matching(&mut self, pattern: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .entry_keys()?
            .into_iter()
            .filter(|k| {
                CacheKey::from_raw(&k[self.namespace.len()..])
                    .endpoint()
                    .contains(pattern)
            })
            .collect();
        self.backend.remove_items(&keys)?;
        Ok(keys.len())
    }

    // == Accounting ==
    /// Sum of serialized lengths of all entries under the namespace.
    pub fn size_bytes(&self) -> Result<usize> {
        let mut total = 0;
        for key in self.entry_keys()? {
            total += self.backend.size_of(&key)?;
        }
        Ok(total)
    }

    /// Keys (without the namespace) that start with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<BTreeSet<String>> {
        let full_prefix = format!("{}{}", self.namespace, prefix);
        Ok(self
            .entry_keys()?
            .into_iter()
            .filter(|k| k.starts_with(&full_prefix))
            .map(|k| k[self.namespace.len()..].to_string())
            .collect())
    }

    /// Number of entries under the namespace.
    pub fn len(&self) -> usize {
        self.entry_keys().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Returns true if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Evict ==
    /// Removes the oldest entries until at least `reclaim` bytes are freed.
    ///
    /// Returns the number of entries removed.
    pub fn evict(&mut self, reclaim: usize) -> Result<usize> {
        self.evict_excluding(reclaim, None)
    }

    /// Like [`Store::evict`], never choosing the entry at `keep`.
    ///
    /// A key about to be overwritten is kept out of the plan: its bytes are
    /// already discounted from usage and freeing them reclaims nothing.
    fn evict_excluding(&mut self, reclaim: usize, keep: Option<&str>) -> Result<usize> {
        let mut candidates = Vec::new();
        for key in self.entry_keys()? {
            if keep == Some(key.as_str()) {
                continue;
            }
            let Some(raw) = self.backend.get_item(&key)? else {
                continue;
            };
            let timestamp = serde_json::from_str::<CacheEntry<Value>>(&raw)
                .map(|entry| entry.timestamp)
                .unwrap_or(0);
            candidates.push(EvictionCandidate {
                key,
                timestamp,
                size: raw.len(),
            });
        }

        let victims = self.policy.plan(candidates, reclaim);
        self.backend.remove_items(&victims)?;

        if !victims.is_empty() {
            info!("Evicted {} cache entries", victims.len());
            self.stats.record_evictions(victims.len());
        }
        Ok(victims.len())
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.len();
        stats.size_bytes = self.size_bytes().unwrap_or(0);
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    /// Byte budget in effect.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.namespace)
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{current_timestamp_ms, MemoryBackend};
    use serde_json::json;
    use std::time::Duration;

    fn store() -> Store {
        Store::new(
            Box::new(MemoryBackend::new()),
            "test_",
            EvictionPolicy::new(1024 * 1024, 0.8),
        )
    }

    fn entry(data: Value) -> CacheEntry<Value> {
        CacheEntry::new(data, DEFAULT_VERSION, Duration::from_secs(300))
    }

    fn key(raw: &str) -> CacheKey {
        CacheKey::from_raw(raw)
    }

    #[test]
    fn test_set_and_get() {
        let mut store = store();
        let stored = entry(json!({"id": 3, "title": "Notes"}));

        assert!(store.set(&key("k"), &stored).unwrap());
        assert_eq!(store.get(&key("k")), Some(stored));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let mut store = store();
        assert!(store.get(&key("missing")).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_default_version() {
        let store = store();
        assert_eq!(store.current_version(), "1.0.0");
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let mut store = store();
        let expired = CacheEntry {
            data: json!("old"),
            timestamp: current_timestamp_ms() - 10 * 60 * 1000,
            version: DEFAULT_VERSION.to_string(),
            expiry: 5 * 60 * 1000,
        };
        store.set(&key("k"), &expired).unwrap();

        assert!(store.get(&key("k")).is_none());
        assert!(store.get_stale(&key("k")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_lookup_keeps_expired_entry_for_fallback() {
        let mut store = store();
        let expired = CacheEntry {
            data: json!("old"),
            timestamp: current_timestamp_ms() - 10 * 60 * 1000,
            version: DEFAULT_VERSION.to_string(),
            expiry: 5 * 60 * 1000,
        };
        store.set(&key("k"), &expired).unwrap();

        assert!(store.lookup(&key("k")).is_none());
        assert_eq!(store.stats().misses, 1);
        assert_eq!(store.get_stale(&key("k")), Some(expired));
    }

    #[test]
    fn test_get_stale_ignores_validity() {
        let mut store = store();
        let outdated = CacheEntry::new(json!("v0"), "0.9.0", Duration::from_secs(300));
        store.set(&key("k"), &outdated).unwrap();

        assert_eq!(store.get_stale(&key("k")).map(|e| e.data), Some(json!("v0")));
    }

    #[test]
    fn test_corrupt_entry_is_removed() {
        let mut backend = MemoryBackend::new();
        backend.set_item("test_bad", "{not json").unwrap();
        let mut store = Store::new(Box::new(backend), "test_", EvictionPolicy::default());

        assert!(store.get(&key("bad")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_version_clears_entries_but_keeps_version() {
        let mut store = store();
        store.set(&key("a"), &entry(json!(1))).unwrap();
        store.set(&key("b"), &entry(json!(2))).unwrap();

        assert_eq!(store.update_version("1.0.1").unwrap(), 2);
        assert_eq!(store.current_version(), "1.0.1");
        assert!(store.get(&key("a")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_version_change_invalidates_without_clear() {
        let mut store = store();
        store.set(&key("a"), &entry(json!(1))).unwrap();
        store.set_version("2.0.0").unwrap();

        assert!(store.get(&key("a")).is_none());
    }

    #[test]
    fn test_clear_leaves_foreign_keys() {
        let mut backend = MemoryBackend::new();
        backend.set_item("unrelated", "keep me").unwrap();
        let mut store = Store::new(Box::new(backend), "test_", EvictionPolicy::default());
        store.set(&key("a"), &entry(json!(1))).unwrap();

        assert_eq!(store.clear().unwrap(), 1);
        assert_eq!(store.size_bytes().unwrap(), 0);
    }

    #[test]
    fn test_remove_matching() {
        let mut store = store();
        store.set(&key("documents_title=A"), &entry(json!(1))).unwrap();
        store.set(&key("documents_title=B"), &entry(json!(2))).unwrap();
        store.set(&key("categories_title=A"), &entry(json!(3))).unwrap();

        assert_eq!(store.remove_matching("documents").unwrap(), 2);
        assert_eq!(
            store.keys_with_prefix("").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["categories_title=A".to_string()]
        );
    }

    #[test]
    fn test_keys_with_prefix() {
        let mut store = store();
        store.set(&key("text_a"), &entry(json!("a"))).unwrap();
        store.set(&key("text_b"), &entry(json!("b"))).unwrap();
        store.set(&key("json"), &entry(json!("c"))).unwrap();

        let keys = store.keys_with_prefix("text_").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("text_a"));
    }

    #[test]
    fn test_size_bytes_tracks_serialized_length() {
        let mut store = store();
        let stored = entry(json!("value"));
        let expected = serde_json::to_string(&stored).unwrap().len();

        store.set(&key("k"), &stored).unwrap();
        assert_eq!(store.size_bytes().unwrap(), expected);
    }

    #[test]
    fn test_budget_eviction_removes_oldest() {
        let mut store = Store::new(
            Box::new(MemoryBackend::new()),
            "test_",
            EvictionPolicy::new(400, 0.8),
        );
        let now = current_timestamp_ms();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let e = CacheEntry {
                data: json!("x".repeat(40)),
                timestamp: now + i as u64,
                version: DEFAULT_VERSION.to_string(),
                expiry: 60_000,
            };
            store.set(&key(name), &e).unwrap();
        }
        assert_eq!(store.len(), 3);

        let newest = CacheEntry {
            data: json!("y".repeat(40)),
            timestamp: now + 10,
            version: DEFAULT_VERSION.to_string(),
            expiry: 60_000,
        };
        store.set(&key("d"), &newest).unwrap();

        let after = store.size_bytes().unwrap();
        assert!(after <= 400);
        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("c")).is_some());
        assert!(store.get(&key("d")).is_some());
        assert!(store.stats().evictions >= 1);
    }

    #[test]
    fn test_overwriting_oldest_entry_stays_within_budget() {
        let mut store = Store::new(
            Box::new(MemoryBackend::new()),
            "test_",
            EvictionPolicy::new(1000, 0.8),
        );
        let now = current_timestamp_ms();
        let at = |offset: u64, len: usize| CacheEntry {
            data: json!("x".repeat(len)),
            timestamp: now + offset,
            version: DEFAULT_VERSION.to_string(),
            expiry: 60_000,
        };

        store.set(&key("k"), &at(0, 400)).unwrap();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            store.set(&key(name), &at(1 + i as u64, 40)).unwrap();
        }
        assert_eq!(store.len(), 5);
        assert!(store.size_bytes().unwrap() > 800);

        let larger = at(10, 550);
        assert!(store.set(&key("k"), &larger).unwrap());

        assert!(store.size_bytes().unwrap() <= 1000);
        assert_eq!(store.get(&key("k")), Some(larger));
        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("d")).is_some());
    }

    #[test]
    fn test_remove_matching_uses_requested_endpoint() {
        let mut store = store();
        let documents = CacheKey::for_json("documents?category_id=5");
        let text = CacheKey::for_text("documents/intro_notes.md");
        store.set(&documents, &entry(json!(1))).unwrap();
        store.set(&text, &entry(json!("# Intro"))).unwrap();
        store.set(&CacheKey::for_json("categories"), &entry(json!(2))).unwrap();

        assert_eq!(store.remove_matching("category_id=5").unwrap(), 1);
        assert!(store.get_stale(&documents).is_none());
        assert_eq!(store.remove_matching("intro_notes").unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    /// Counts removal calls reaching the medium.
    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        single_removals: usize,
        batch_removals: usize,
    }

    impl StorageBackend for CountingBackend {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
            self.inner.set_item(key, value)
        }

        fn remove_item(&mut self, key: &str) -> Result<()> {
            self.single_removals += 1;
            self.inner.remove_item(key)
        }

        fn remove_items(&mut self, keys: &[String]) -> Result<()> {
            self.batch_removals += 1;
            for key in keys {
                self.inner.remove_item(key)?;
            }
            Ok(())
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_bulk_removals_reach_medium_as_one_batch() {
        use std::sync::{Arc, Mutex};

        /// Shares the counters with the test after the store takes ownership.
        struct Shared(Arc<Mutex<CountingBackend>>);

        impl StorageBackend for Shared {
            fn get_item(&self, key: &str) -> Result<Option<String>> {
                self.0.lock().unwrap().get_item(key)
            }
            fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
                self.0.lock().unwrap().set_item(key, value)
            }
            fn remove_item(&mut self, key: &str) -> Result<()> {
                self.0.lock().unwrap().remove_item(key)
            }
            fn remove_items(&mut self, keys: &[String]) -> Result<()> {
                self.0.lock().unwrap().remove_items(keys)
            }
            fn keys(&self) -> Result<Vec<String>> {
                self.0.lock().unwrap().keys()
            }
        }

        let counts = Arc::new(Mutex::new(CountingBackend::default()));
        let mut store = Store::new(
            Box::new(Shared(Arc::clone(&counts))),
            "test_",
            EvictionPolicy::default(),
        );
        for name in ["documents_a", "documents_b", "c", "d", "e"] {
            store.set(&key(name), &entry(json!(name))).unwrap();
        }

        assert_eq!(store.remove_matching("documents").unwrap(), 2);
        assert_eq!(store.evict(1).unwrap(), 1);
        assert_eq!(store.clear().unwrap(), 2);

        let counts = counts.lock().unwrap();
        assert_eq!(counts.batch_removals, 3);
        assert_eq!(counts.single_removals, 0);
    }

    #[test]
    fn test_quota_exceeded_evicts_and_retries() {
        let mut store = Store::new(
            Box::new(MemoryBackend::with_quota(400)),
            "test_",
            EvictionPolicy::new(1024 * 1024, 0.8),
        );
        store.set(&key("old"), &entry(json!("a".repeat(150)))).unwrap();
        store.set(&key("mid"), &entry(json!("b".repeat(150)))).unwrap_or(false);

        let stored = store.set(&key("new"), &entry(json!("c".repeat(150)))).unwrap();
        assert!(stored);
        assert!(store.get(&key("new")).is_some());
    }

    #[test]
    fn test_write_dropped_when_still_full() {
        let mut store = Store::new(
            Box::new(MemoryBackend::with_quota(50)),
            "test_",
            EvictionPolicy::default(),
        );

        let stored = store.set(&key("huge"), &entry(json!("z".repeat(500)))).unwrap();
        assert!(!stored);
        assert_eq!(store.stats().dropped_writes, 1);
        assert!(store.is_empty());
    }
}
