//! Shared test fixtures
//!
//! A scripted in-process origin standing in for the HTTP transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use origin_cache::cache::{EvictionPolicy, MemoryBackend, StorageBackend, Store};
use origin_cache::error::{CacheError, Result};
use origin_cache::fetch::{OriginResponse, Transport};
use origin_cache::OriginCache;

pub const NAMESPACE: &str = "test_";

/// Origin answering from a table of scripted responses.
///
/// Unscripted endpoints answer `404 Not Found`. While held, every request
/// waits until the origin is released.
pub struct ScriptedOrigin {
    responses: Mutex<HashMap<String, Result<OriginResponse>>>,
    calls: Mutex<Vec<String>>,
    open: watch::Sender<bool>,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            open: watch::Sender::new(true),
        })
    }

    /// Answers `endpoint` with a 200 carrying `body`.
    pub fn respond(&self, endpoint: &str, body: &str) {
        self.script(endpoint, Ok(OriginResponse::ok(body)));
    }

    /// Answers `endpoint` with an error status.
    pub fn fail_status(&self, endpoint: &str, status: u16, reason: &str) {
        self.script(endpoint, Ok(OriginResponse::with_status(status, reason)));
    }

    /// Makes `endpoint` unreachable.
    pub fn fail_network(&self, endpoint: &str) {
        self.script(
            endpoint,
            Err(CacheError::Network("connection refused".to_string())),
        );
    }

    fn script(&self, endpoint: &str, response: Result<OriginResponse>) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), response);
    }

    /// Number of requests received for `endpoint`.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == endpoint)
            .count()
    }

    /// Total number of requests received.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Makes requests wait until [`ScriptedOrigin::release`].
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    /// Lets held and future requests proceed.
    pub fn release(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl Transport for ScriptedOrigin {
    async fn get(&self, endpoint: &str) -> Result<OriginResponse> {
        self.calls.lock().unwrap().push(endpoint.to_string());

        let mut open = self.open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(CacheError::Network("origin shut down".to_string()));
        }

        let response = self.responses.lock().unwrap().get(endpoint).cloned();
        response.unwrap_or_else(|| Ok(OriginResponse::with_status(404, "Not Found")))
    }
}

/// Cache over `backend`, fetching from `origin`, with a five minute default TTL.
pub fn cache_over(backend: Box<dyn StorageBackend>, origin: &Arc<ScriptedOrigin>) -> Arc<OriginCache> {
    let store = Store::new(backend, NAMESPACE, EvictionPolicy::default());
    Arc::new(OriginCache::new(
        store,
        origin.clone(),
        std::time::Duration::from_secs(300),
    ))
}

/// In-memory cache fetching from `origin`.
pub fn memory_cache(origin: &Arc<ScriptedOrigin>) -> Arc<OriginCache> {
    cache_over(Box::new(MemoryBackend::new()), origin)
}
