//! Origin Cache - A fetch-through response cache
//!
//! Persists origin responses with TTL and version validity, collapses
//! concurrent requests for the same resource, and invalidates everything
//! when the origin's version token changes.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use context::CacheContext;
pub use error::{CacheError, Result};
pub use fetch::{FetchConfig, OriginCache};
pub use tasks::{InvalidationEvent, VersionMonitor};
