//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::Value;

use crate::context::CacheContext;
use crate::error::{CacheError, Result};
use crate::fetch::{OriginCache, PayloadFormat};
use crate::models::{
    FetchQuery, HealthResponse, InvalidateQuery, InvalidateResponse, StatsResponse,
    VersionRequest, VersionResponse,
};
use crate::tasks::VersionMonitor;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fetch-through-cache client
    pub cache: Arc<OriginCache>,
    /// Version monitor of the same cache
    pub monitor: Arc<VersionMonitor>,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(cache: Arc<OriginCache>, monitor: Arc<VersionMonitor>) -> Self {
        Self { cache, monitor }
    }

    /// Creates a new AppState sharing an opened context.
    pub fn from_context(context: &CacheContext) -> Self {
        Self::new(Arc::clone(context.cache()), Arc::clone(context.monitor()))
    }
}

/// Handler for GET /fetch
///
/// Fetches a JSON endpoint through the cache.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Value>> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let data = state
        .cache
        .fetch_value(&query.endpoint, PayloadFormat::Json, &query.fetch_config())
        .await?;
    Ok(Json(data))
}

/// Handler for GET /text
///
/// Fetches a text endpoint through the cache.
pub async fn text_handler(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Result<String> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state
        .cache
        .cached_fetch_text(&query.endpoint, &query.fetch_config())
        .await
}

/// Handler for DELETE /cache
///
/// Removes entries matching `pattern`, or every entry.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let pattern = query.pattern.as_deref().filter(|p| !p.is_empty());
    let removed = match pattern {
        Some(pattern) => state.cache.invalidate_matching(pattern).await?,
        None => state.cache.invalidate_all().await?,
    };

    Ok(Json(InvalidateResponse::new(pattern, removed)))
}

/// Handler for PUT /version
///
/// Sets the current version, clearing every entry when it changes.
pub async fn set_version_handler(
    State(state): State<AppState>,
    Json(req): Json<VersionRequest>,
) -> Result<Json<VersionResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let changed = state.cache.current_version().await != req.version;
    if changed {
        state.cache.update_version(&req.version).await?;
    }

    Ok(Json(VersionResponse::new(
        req.version,
        changed,
        state.monitor.last_known_version(),
    )))
}

/// Handler for POST /version/check
///
/// Runs one version check against the origin.
pub async fn check_version_handler(State(state): State<AppState>) -> Json<VersionResponse> {
    let changed = state.monitor.check_now().await.is_some();

    Json(VersionResponse::new(
        state.cache.current_version().await,
        changed,
        state.monitor.last_known_version(),
    ))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats().await;

    Json(StatsResponse::new(
        stats,
        state.cache.pending_requests(),
        state.cache.current_version().await,
        state.monitor.last_known_version(),
    ))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
