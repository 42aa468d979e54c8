//! Invalidation Events
//!
//! Observer registry notified whenever a version change clears the cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

/// Broadcast once per detected version change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEvent {
    /// The version the cache switched to
    pub version: String,
}

type Callback = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

fn lock(observers: &Mutex<Observers>) -> MutexGuard<'_, Observers> {
    observers.lock().unwrap_or_else(PoisonError::into_inner)
}

// == Invalidations ==
/// Registered observers of [`InvalidationEvent`]s.
#[derive(Clone, Default)]
pub struct Invalidations {
    inner: Arc<Mutex<Observers>>,
}

impl Invalidations {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` until the returned handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        let mut observers = lock(&self.inner);
        observers.next_id += 1;
        let id = observers.next_id;
        observers.callbacks.insert(id, Arc::new(callback));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Delivers `event` to every current observer.
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe themselves.
    pub fn emit(&self, event: &InvalidationEvent) {
        let callbacks: Vec<Callback> = lock(&self.inner).callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.inner).callbacks.len()
    }
}

impl std::fmt::Debug for Invalidations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidations")
            .field("observers", &self.observer_count())
            .finish()
    }
}

// == Subscription ==
/// Handle keeping an observer registered.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Observers>>,
    id: u64,
}

impl Subscription {
    /// Deregisters the observer.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).callbacks.remove(&self.id);
        }
    }
}
