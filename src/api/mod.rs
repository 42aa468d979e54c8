//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `GET /fetch` - Fetch a JSON endpoint through the cache
//! - `GET /text` - Fetch a text endpoint through the cache
//! - `DELETE /cache` - Invalidate entries
//! - `PUT /version` - Set the current version
//! - `POST /version/check` - Check the origin's version now
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
