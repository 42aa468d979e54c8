//! Version Sync Task
//!
//! Background task that polls the origin's version token and invalidates
//! the cache when it changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::{FetchConfig, OriginCache};
use crate::tasks::{InvalidationEvent, Invalidations, Subscription};

/// Body of the version endpoint.
#[derive(Debug, Deserialize)]
struct VersionToken {
    version: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-progress flag when a check ends, even if it is aborted.
struct CheckingGuard<'a>(&'a AtomicBool);

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State shared between the monitor handle and its task.
struct MonitorState {
    cache: Arc<OriginCache>,
    endpoint: String,
    version_ttl: Duration,
    last_known: Mutex<Option<String>>,
    checking: AtomicBool,
    invalidations: Invalidations,
}

impl MonitorState {
    fn fetch_config(&self, force_refresh: bool) -> FetchConfig {
        FetchConfig {
            ttl: Some(self.version_ttl),
            version: None,
            force_refresh,
        }
    }

    async fn initialize(&self) {
        match self
            .cache
            .cached_fetch::<VersionToken>(&self.endpoint, &self.fetch_config(false))
            .await
        {
            Ok(token) => {
                info!("Cache sync initialized with version {}", token.version);
                *lock(&self.last_known) = Some(token.version);
            }
            Err(e) => warn!("Failed to initialize cache sync: {}", e),
        }
    }

    async fn check(&self) -> Option<InvalidationEvent> {
        if self
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Version check already in progress, skipping");
            return None;
        }
        let _guard = CheckingGuard(&self.checking);

        let token = match self
            .cache
            .cached_fetch::<VersionToken>(&self.endpoint, &self.fetch_config(true))
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to check cache version: {}", e);
                return None;
            }
        };

        let previous = lock(&self.last_known).replace(token.version.clone());
        match previous {
            Some(previous) if previous != token.version => {
                info!("Cache version changed: {} -> {}", previous, token.version);
                if let Err(e) = self.cache.update_version(&token.version).await {
                    warn!("Failed to apply cache version {}: {}", token.version, e);
                }
                let event = InvalidationEvent {
                    version: token.version,
                };
                self.invalidations.emit(&event);
                Some(event)
            }
            _ => {
                debug!("Cache version unchanged: {}", token.version);
                None
            }
        }
    }
}

// == Version Monitor ==
/// Polls the origin's version endpoint on a fixed interval.
///
/// A changed token sets it as the current cache version, which clears the
/// store, and notifies every subscriber once.
pub struct VersionMonitor {
    state: Arc<MonitorState>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VersionMonitor {
    /// Creates a stopped monitor.
    ///
    /// # Arguments
    /// * `cache` - Client the version token is fetched through
    /// * `endpoint` - Version endpoint relative to the origin
    /// * `version_ttl` - TTL for the cached version token
    /// * `period` - Interval between checks
    pub fn new(
        cache: Arc<OriginCache>,
        endpoint: impl Into<String>,
        version_ttl: Duration,
        period: Duration,
    ) -> Self {
        Self {
            state: Arc::new(MonitorState {
                cache,
                endpoint: endpoint.into(),
                version_ttl,
                last_known: Mutex::new(None),
                checking: AtomicBool::new(false),
                invalidations: Invalidations::new(),
            }),
            period,
            task: Mutex::new(None),
        }
    }

    /// Creates a stopped monitor from configuration.
    pub fn from_config(cache: Arc<OriginCache>, config: &Config) -> Self {
        Self::new(
            cache,
            config.version_endpoint.clone(),
            Duration::from_millis(config.version_ttl_ms),
            config.sync_period(),
        )
    }

    /// Starts polling. Does nothing if already running.
    ///
    /// The task fetches the initial token immediately, then checks once per
    /// period. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Version monitor already running");
            return;
        }

        let state = Arc::clone(&self.state);
        let period = self.period;
        *task = Some(tokio::spawn(async move {
            state.initialize().await;

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                state.check().await;
            }
        }));

        info!("Version monitor started with interval of {:?}", period);
    }

    /// Stops polling. Does nothing if not running.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            info!("Version monitor stopped");
        }
    }

    /// Returns true while the polling task is alive.
    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one version check now.
    ///
    /// Returns the broadcast event if the version changed. Skipped while
    /// another check is in progress; failures are logged and yield `None`.
    pub async fn check_now(&self) -> Option<InvalidationEvent> {
        self.state.check().await
    }

    /// Last version token seen from the origin.
    pub fn last_known_version(&self) -> Option<String> {
        lock(&self.state.last_known).clone()
    }

    /// Registers `callback` for invalidation events.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        self.state.invalidations.subscribe(callback)
    }

    /// The observer registry events are broadcast through.
    pub fn invalidations(&self) -> &Invalidations {
        &self.state.invalidations
    }
}

impl Drop for VersionMonitor {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for VersionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionMonitor")
            .field("endpoint", &self.state.endpoint)
            .field("period", &self.period)
            .field("last_known", &self.last_known_version())
            .field("running", &self.is_running())
            .finish()
    }
}
