//! Fetch-Through-Cache Client
//!
//! Ties the store, the coalescer and the origin transport together.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStats, Store};
use crate::error::{CacheError, Result};
use crate::fetch::{Coalescer, Transport};

// == Fetch Config ==
/// Per-call options for [`OriginCache::cached_fetch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchConfig {
    /// TTL for the written entry (cache default when `None`)
    pub ttl: Option<Duration>,
    /// Version tag for the written entry (current version when `None`)
    pub version: Option<String>,
    /// Skip the cache and coalescing, always go to the origin
    pub force_refresh: bool,
}

impl FetchConfig {
    /// Config with a TTL override.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Config bypassing cache and coalescing.
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    /// Sets `force_refresh`.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

// == Payload Format ==
/// How a response body is decoded and which key space it is cached under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Structured JSON body
    Json,
    /// Raw UTF-8 text body
    Text,
}

impl PayloadFormat {
    /// Cache key for `endpoint` in this format's key space.
    pub fn key_for(self, endpoint: &str) -> CacheKey {
        match self {
            PayloadFormat::Json => CacheKey::for_json(endpoint),
            PayloadFormat::Text => CacheKey::for_text(endpoint),
        }
    }

    /// Decodes a response body.
    pub fn decode(self, body: &[u8]) -> Result<Value> {
        match self {
            PayloadFormat::Json => Ok(serde_json::from_slice(body)?),
            PayloadFormat::Text => String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|e| CacheError::Decode(e.to_string())),
        }
    }
}

// == Retrieval ==
/// One network round trip with write-back and stale fallback.
///
/// Owns everything it needs so it can outlive the caller that started it.
struct Retrieval {
    store: Arc<RwLock<Store>>,
    transport: Arc<dyn Transport>,
    key: CacheKey,
    endpoint: String,
    format: PayloadFormat,
    ttl: Duration,
    version: Option<String>,
    /// Serve a valid entry written since the caller's cache miss
    recheck: bool,
}

impl Retrieval {
    async fn run(self) -> Result<Value> {
        if self.recheck {
            if let Some(data) = self.fresh_entry().await {
                debug!("Entry {} written by a concurrent retrieval", self.key);
                return Ok(data);
            }
        }

        match self.fetch_remote().await {
            Ok(data) => {
                self.write_back(&data).await;
                Ok(data)
            }
            Err(err) => {
                let mut store = self.store.write().await;
                match store.get_stale(&self.key) {
                    Some(entry) => {
                        warn!("Fetch failed for {}, using stale cache: {}", self.endpoint, err);
                        store.stats_mut().record_stale_hit();
                        Ok(entry.data)
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn fresh_entry(&self) -> Option<Value> {
        let mut store = self.store.write().await;
        let version = store.current_version();
        store
            .get_stale(&self.key)
            .filter(|entry| entry.is_valid(&version))
            .map(|entry| entry.data)
    }

    async fn fetch_remote(&self) -> Result<Value> {
        let response = self.transport.get(&self.endpoint).await?;
        if !response.is_success() {
            return Err(CacheError::Status {
                status: response.status,
                reason: response.reason,
            });
        }
        self.format.decode(&response.body)
    }

    async fn write_back(&self, data: &Value) {
        let mut store = self.store.write().await;
        let version = match &self.version {
            Some(version) => version.clone(),
            None => store.current_version(),
        };
        let entry = CacheEntry::new(data.clone(), version, self.ttl);

        match store.set(&self.key, &entry) {
            Ok(true) => debug!("Cached {} for {:?}", self.key, self.ttl),
            // Already reported by the store
            Ok(false) => {}
            Err(e) => warn!("Cache storage failed for {}: {}", self.key, e),
        }
    }
}

// == Origin Cache ==
/// Fetch-through-cache client for one origin.
///
/// Fresh entries are served from the store; misses are fetched once no
/// matter how many callers ask concurrently; failed fetches fall back to
/// whatever entry is stored, expired or not.
pub struct OriginCache {
    store: Arc<RwLock<Store>>,
    pending: Coalescer,
    transport: Arc<dyn Transport>,
    default_ttl: Duration,
}

impl OriginCache {
    // == Constructor ==
    /// Creates a client over `store`, fetching through `transport`.
    ///
    /// # Arguments
    /// * `store` - Entry storage
    /// * `transport` - Network primitive reaching the origin
    /// * `default_ttl` - TTL for entries fetched without an explicit TTL
    pub fn new(store: Store, transport: Arc<dyn Transport>, default_ttl: Duration) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            pending: Coalescer::new(),
            transport,
            default_ttl,
        }
    }

    // == Fetch ==
    /// Fetches `endpoint` as JSON, decoded into `T`.
    pub async fn cached_fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: &FetchConfig,
    ) -> Result<T> {
        let data = self.fetch_value(endpoint, PayloadFormat::Json, config).await?;
        serde_json::from_value(data).map_err(|e| CacheError::Decode(e.to_string()))
    }

    /// Fetches `endpoint` as raw text.
    pub async fn cached_fetch_text(&self, endpoint: &str, config: &FetchConfig) -> Result<String> {
        match self.fetch_value(endpoint, PayloadFormat::Text, config).await? {
            Value::String(text) => Ok(text),
            other => Err(CacheError::Decode(format!(
                "expected cached text for {}, found {}",
                endpoint, other
            ))),
        }
    }

    /// Fetches `endpoint` in `format`, returning the undecoded payload.
    pub async fn fetch_value(
        &self,
        endpoint: &str,
        format: PayloadFormat,
        config: &FetchConfig,
    ) -> Result<Value> {
        let key = format.key_for(endpoint);

        if config.force_refresh {
            debug!("Forced refresh of {}", endpoint);
            return self.retrieval(key, endpoint, format, config).run().await;
        }

        if let Some(entry) = self.store.write().await.lookup(&key) {
            debug!("Cache hit for {}", key);
            return Ok(entry.data);
        }

        let (fetch, joined) = self.pending.join_or_start(&key, || {
            self.retrieval(key.clone(), endpoint, format, config)
                .run()
                .boxed()
        });
        if joined {
            debug!("Joined pending request for {}", key);
            self.store.write().await.stats_mut().record_coalesced();
        }

        fetch.await
    }

    fn retrieval(
        &self,
        key: CacheKey,
        endpoint: &str,
        format: PayloadFormat,
        config: &FetchConfig,
    ) -> Retrieval {
        Retrieval {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            key,
            endpoint: endpoint.to_string(),
            format,
            ttl: config.ttl.unwrap_or(self.default_ttl),
            version: config.version.clone(),
            recheck: !config.force_refresh,
        }
    }

    // == Direct Access ==
    /// Stores `data` as the JSON payload of `endpoint`.
    ///
    /// Returns false when the write was dropped because storage stayed full.
    pub async fn set<T: Serialize>(
        &self,
        endpoint: &str,
        data: &T,
        config: &FetchConfig,
    ) -> Result<bool> {
        let data = serde_json::to_value(data)?;
        let mut store = self.store.write().await;
        let version = match &config.version {
            Some(version) => version.clone(),
            None => store.current_version(),
        };
        let entry = CacheEntry::new(data, version, config.ttl.unwrap_or(self.default_ttl));
        store.set(&CacheKey::for_json(endpoint), &entry)
    }

    /// Returns the valid JSON payload of `endpoint` without touching the network.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Option<T> {
        let entry = self.store.write().await.get(&CacheKey::for_json(endpoint))?;
        serde_json::from_value(entry.data).ok()
    }

    /// Removes the JSON and text payloads of `endpoint`.
    pub async fn remove(&self, endpoint: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        let json = store.remove(&CacheKey::for_json(endpoint))?;
        let text = store.remove(&CacheKey::for_text(endpoint))?;
        Ok(json || text)
    }

    // == Invalidation ==
    /// Removes every entry, keeping the current version.
    pub async fn invalidate_all(&self) -> Result<usize> {
        self.store.write().await.clear()
    }

    /// Removes every entry whose key contains `pattern`.
    pub async fn invalidate_matching(&self, pattern: &str) -> Result<usize> {
        self.store.write().await.remove_matching(pattern)
    }

    /// Sets the current version and clears every entry.
    pub async fn update_version(&self, version: &str) -> Result<usize> {
        self.store.write().await.update_version(version)
    }

    /// Returns the current version.
    pub async fn current_version(&self) -> String {
        self.store.read().await.current_version()
    }

    // == Introspection ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    /// Number of retrievals currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for OriginCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginCache")
            .field("pending", &self.pending)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
