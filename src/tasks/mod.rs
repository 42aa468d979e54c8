//! Background Tasks Module
//!
//! Contains the tasks that run alongside the cache.
//!
//! # Tasks
//! - Version Sync: Polls the origin's version token and invalidates on change

mod events;
mod version_sync;

pub use events::{InvalidationEvent, Invalidations, Subscription};
pub use version_sync::VersionMonitor;
