//! Request Coalescer
//!
//! Collapses concurrent retrievals of the same key into one in-flight future.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::debug;

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};

/// A retrieval every interested caller can await.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

#[derive(Default)]
struct Registry {
    next_ticket: u64,
    pending: HashMap<CacheKey, (u64, SharedFetch)>,
}

// == Coalescer ==
/// Registry of in-flight retrievals keyed by cache key.
///
/// Registered retrievals are spawned onto the runtime, so they run to
/// completion even when every awaiting caller goes away. The registry entry
/// is removed when the retrieval settles, including by panic.
#[derive(Clone, Default)]
pub struct Coalescer {
    inner: Arc<Mutex<Registry>>,
}

/// Removes its registry entry when dropped.
struct PendingGuard {
    registry: Arc<Mutex<Registry>>,
    key: CacheKey,
    ticket: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        // A later registration for the same key must survive
        if matches!(registry.pending.get(&self.key), Some((ticket, _)) if *ticket == self.ticket) {
            registry.pending.remove(&self.key);
            debug!("Released pending request {}", self.key);
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coalescer {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the in-flight retrieval for `key`, if any.
    pub fn get_pending(&self, key: &CacheKey) -> Option<SharedFetch> {
        lock(&self.inner).pending.get(key).map(|(_, fetch)| fetch.clone())
    }

    /// Registers `retrieval` as the in-flight request for `key`.
    ///
    /// Replaces any previous registration for the key.
    pub fn set_pending(
        &self,
        key: CacheKey,
        retrieval: BoxFuture<'static, Result<Value>>,
    ) -> SharedFetch {
        let mut registry = lock(&self.inner);
        self.register(&mut registry, key, retrieval)
    }

    /// Joins the in-flight retrieval for `key`, or registers the one built by `start`.
    ///
    /// The lookup and the registration happen under one lock. Returns the
    /// shared retrieval and whether an existing one was joined.
    pub fn join_or_start<F>(&self, key: &CacheKey, start: F) -> (SharedFetch, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value>>,
    {
        let mut registry = lock(&self.inner);
        if let Some((_, fetch)) = registry.pending.get(key) {
            return (fetch.clone(), true);
        }
        let fetch = self.register(&mut registry, key.clone(), start());
        (fetch, false)
    }

    fn register(
        &self,
        registry: &mut Registry,
        key: CacheKey,
        retrieval: BoxFuture<'static, Result<Value>>,
    ) -> SharedFetch {
        registry.next_ticket += 1;
        let guard = PendingGuard {
            registry: Arc::clone(&self.inner),
            key: key.clone(),
            ticket: registry.next_ticket,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            retrieval.await
        });
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CacheError::Internal(format!("retrieval task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        registry
            .pending
            .insert(key, (registry.next_ticket, fetch.clone()));
        fetch
    }

    /// Number of in-flight retrievals.
    pub fn len(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn key(raw: &str) -> CacheKey {
        CacheKey::from_raw(raw)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_retrieval() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let counter = Arc::clone(&calls);
        let (first, joined) = coalescer.join_or_start(&key("k"), move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = rx.await;
                Ok(json!({"id": 5}))
            }
            .boxed()
        });
        assert!(!joined);

        let (second, joined) =
            coalescer.join_or_start(&key("k"), || async { Ok(json!("unused")) }.boxed());
        assert!(joined);
        assert_eq!(coalescer.len(), 1);

        tx.send(()).unwrap();
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap(), json!({"id": 5}));
        assert_eq!(b.unwrap(), json!({"id": 5}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_removed_after_settlement() {
        let coalescer = Coalescer::new();

        let fetch = coalescer.set_pending(key("k"), async { Ok(json!(1)) }.boxed());
        assert!(coalescer.get_pending(&key("k")).is_some());

        fetch.await.unwrap();
        assert!(coalescer.get_pending(&key("k")).is_none());
        assert!(coalescer.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_released() {
        let coalescer = Coalescer::new();

        let (first, _) = coalescer.join_or_start(&key("k"), || {
            async { Err(CacheError::Network("connection reset".to_string())) }.boxed()
        });
        let second = coalescer.get_pending(&key("k"));

        assert_eq!(
            first.await,
            Err(CacheError::Network("connection reset".to_string()))
        );
        if let Some(second) = second {
            assert!(second.await.is_err());
        }
        assert!(coalescer.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_completes_without_awaiting_callers() {
        let coalescer = Coalescer::new();
        let (tx, rx) = oneshot::channel::<()>();

        let fetch = coalescer.set_pending(
            key("k"),
            async move {
                let _ = tx.send(());
                Ok(json!(true))
            }
            .boxed(),
        );
        drop(fetch);

        rx.await.unwrap();
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if coalescer.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(coalescer.is_empty());
    }

    #[tokio::test]
    async fn test_new_call_after_settlement_starts_fresh() {
        let coalescer = Coalescer::new();

        let (first, _) = coalescer.join_or_start(&key("k"), || async { Ok(json!(1)) }.boxed());
        assert_eq!(first.await.unwrap(), json!(1));

        let (second, joined) =
            coalescer.join_or_start(&key("k"), || async { Ok(json!(2)) }.boxed());
        assert!(!joined);
        assert_eq!(second.await.unwrap(), json!(2));
    }
}
