//! Storage Backend Module
//!
//! The key/value medium the cache store persists into.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CacheError, Result};

/// File name of the persisted document inside the cache directory.
pub const STORE_FILE_NAME: &str = "store.json";

/// `ENOSPC` on Unix-like systems.
const NO_SPACE_OS_ERROR: i32 = 28;

// == Storage Backend ==
/// String key/value medium with byte-length accounting.
///
/// Writes that fail because the medium is full must return
/// [`CacheError::QuotaExceeded`] so the store can evict and retry.
pub trait StorageBackend: Send + Sync {
    /// Returns the stored string for `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove_item(&mut self, key: &str) -> Result<()>;

    /// Removes every key in `keys`.
    ///
    /// Media with a costly commit override this to commit once.
    fn remove_items(&mut self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove_item(key)?;
        }
        Ok(())
    }

    /// Lists every key in the medium.
    fn keys(&self) -> Result<Vec<String>>;

    /// Byte length of the value stored under `key`, 0 when absent.
    fn size_of(&self, key: &str) -> Result<usize> {
        Ok(self.get_item(key)?.map(|v| v.len()).unwrap_or(0))
    }
}

fn used_bytes(items: &HashMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

fn check_quota(
    items: &HashMap<String, String>,
    quota: Option<usize>,
    key: &str,
    value: &str,
) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let current = used_bytes(items);
    let replaced = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
    let needed = current - replaced + key.len() + value.len();
    if needed > quota {
        return Err(CacheError::QuotaExceeded(format!(
            "writing '{}' needs {} bytes, quota is {}",
            key, needed, quota
        )));
    }
    Ok(())
}

// == Memory Backend ==
/// In-memory medium with an optional byte quota over keys and values.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Creates an unbounded in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory backend that rejects writes beyond `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: HashMap::new(),
            quota: Some(quota),
        }
    }

    /// Total bytes held, keys included.
    pub fn used_bytes(&self) -> usize {
        used_bytes(&self.items)
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        check_quota(&self.items, self.quota, key, value)?;
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }

    fn size_of(&self, key: &str) -> Result<usize> {
        Ok(self.items.get(key).map(|v| v.len()).unwrap_or(0))
    }
}

// == File Backend ==
/// Durable medium persisting all items as one JSON document.
///
/// The document is rewritten through a temporary file and a rename, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    items: HashMap<String, String>,
    quota: Option<usize>,
}

impl FileBackend {
    /// Opens (or creates) the store document inside `dir`.
    ///
    /// An unreadable document is discarded and the store starts empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE_NAME);

        let items = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Discarding unreadable cache document {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened cache document {} with {} items", path.display(), items.len());
        Ok(Self {
            path,
            items,
            quota: None,
        })
    }

    /// Rejects writes that would grow the document beyond `quota` bytes.
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Location of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &HashMap<String, String>) -> Result<()> {
        let serialized = serde_json::to_string(items)
            .map_err(|e| CacheError::Storage(format!("serialize store document: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");

        let written = fs::write(&tmp, serialized).and_then(|_| fs::rename(&tmp, &self.path));
        match written {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                if e.raw_os_error() == Some(NO_SPACE_OS_ERROR) {
                    Err(CacheError::QuotaExceeded(e.to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        check_quota(&self.items, self.quota, key, value)?;
        let mut next = self.items.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        self.items = next;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        if self.items.remove(key).is_some() {
            self.persist(&self.items)?;
        }
        Ok(())
    }

    fn remove_items(&mut self, keys: &[String]) -> Result<()> {
        let before = self.items.len();
        for key in keys {
            self.items.remove(key);
        }
        if self.items.len() != before {
            self.persist(&self.items)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }

    fn size_of(&self, key: &str) -> Result<usize> {
        Ok(self.items.get(key).map(|v| v.len()).unwrap_or(0))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_remove() {
        let mut backend = MemoryBackend::new();

        backend.set_item("a", "1").unwrap();
        assert_eq!(backend.get_item("a").unwrap(), Some("1".to_string()));
        assert_eq!(backend.size_of("a").unwrap(), 1);

        backend.remove_item("a").unwrap();
        assert_eq!(backend.get_item("a").unwrap(), None);
        backend.remove_item("a").unwrap();
    }

    #[test]
    fn test_memory_quota_rejects_write() {
        let mut backend = MemoryBackend::with_quota(10);

        backend.set_item("k", "12345").unwrap();
        let result = backend.set_item("j", "123456789");
        assert!(matches!(result, Err(CacheError::QuotaExceeded(_))));
        assert_eq!(backend.get_item("j").unwrap(), None);
    }

    #[test]
    fn test_memory_quota_accounts_for_replacement() {
        let mut backend = MemoryBackend::with_quota(10);

        backend.set_item("k", "123456789").unwrap();
        // Replacing the same key only counts the new value
        backend.set_item("k", "987654321").unwrap();
        assert_eq!(backend.used_bytes(), 10);
    }

    #[test]
    fn test_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut backend = FileBackend::open(dir.path()).unwrap();
            backend.set_item("origin_cache_a", "{\"data\":1}").unwrap();
            backend.set_item("cache_version", "1.0.1").unwrap();
        }

        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(
            backend.get_item("origin_cache_a").unwrap(),
            Some("{\"data\":1}".to_string())
        );
        assert_eq!(backend.get_item("cache_version").unwrap(), Some("1.0.1".to_string()));
        assert!(backend.path().ends_with(STORE_FILE_NAME));
    }

    #[test]
    fn test_file_backend_discards_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STORE_FILE_NAME), "not json").unwrap();

        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_quota() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::open(dir.path()).unwrap().with_quota(8);

        let result = backend.set_item("key", "too long value");
        assert!(matches!(result, Err(CacheError::QuotaExceeded(_))));
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_batch_removal() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::open(dir.path()).unwrap();
        for key in ["a", "b", "c"] {
            backend.set_item(key, "1").unwrap();
        }

        backend
            .remove_items(&["a".to_string(), "c".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["b".to_string()]);

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_file_backend_batch_removal_of_missing_keys_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::open(dir.path()).unwrap();
        backend.set_item("a", "1").unwrap();
        fs::remove_file(backend.path()).unwrap();

        backend.remove_items(&["missing".to_string()]).unwrap();
        assert!(!backend.path().exists());
    }
}
