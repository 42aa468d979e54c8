//! Cache Context
//!
//! Owns the fetch client and the version monitor for one origin.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::{EvictionPolicy, FileBackend, StorageBackend, Store};
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{HttpTransport, OriginCache, Transport};
use crate::tasks::VersionMonitor;

/// Timeout for a single origin request.
const ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

// == Cache Context ==
/// Explicitly opened cache for one origin.
///
/// Share it behind an `Arc`; call [`CacheContext::close`] on shutdown.
#[derive(Debug)]
pub struct CacheContext {
    cache: Arc<OriginCache>,
    monitor: Arc<VersionMonitor>,
}

impl CacheContext {
    /// Opens the persisted store under `config.cache_dir` and an HTTP
    /// transport to `config.origin_url`.
    ///
    /// The version monitor is created stopped.
    pub fn open(config: &Config) -> Result<Self> {
        let backend = FileBackend::open(&config.cache_dir)?;
        let transport = HttpTransport::new(config.origin_url.clone(), ORIGIN_TIMEOUT)?;
        info!(
            "Opened cache at {} for origin {}",
            backend.path().display(),
            config.origin_url
        );
        Ok(Self::open_with(config, Box::new(backend), Arc::new(transport)))
    }

    /// Builds a context over the given medium and transport.
    pub fn open_with(
        config: &Config,
        backend: Box<dyn StorageBackend>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let policy = EvictionPolicy::new(config.max_cache_bytes, config.cleanup_threshold);
        let store = Store::new(backend, config.namespace.clone(), policy);
        let cache = Arc::new(OriginCache::new(store, transport, config.default_ttl()));
        let monitor = Arc::new(VersionMonitor::from_config(Arc::clone(&cache), config));
        Self { cache, monitor }
    }

    /// The fetch-through-cache client.
    pub fn cache(&self) -> &Arc<OriginCache> {
        &self.cache
    }

    /// The version monitor.
    pub fn monitor(&self) -> &Arc<VersionMonitor> {
        &self.monitor
    }

    /// Stops background work.
    pub fn close(&self) {
        self.monitor.stop();
        info!("Cache context closed");
    }
}
