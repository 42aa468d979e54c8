//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    check_version_handler, fetch_handler, health_handler, invalidate_handler,
    set_version_handler, stats_handler, text_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /fetch?endpoint=` - Fetch a JSON endpoint through the cache
/// - `GET /text?endpoint=` - Fetch a text endpoint through the cache
/// - `DELETE /cache?pattern=` - Invalidate matching entries, or all
/// - `PUT /version` - Set the current version
/// - `POST /version/check` - Check the origin's version now
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fetch", get(fetch_handler))
        .route("/text", get(text_handler))
        .route("/cache", delete(invalidate_handler))
        .route("/version", put(set_version_handler))
        .route("/version/check", post(check_version_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
