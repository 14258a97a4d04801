//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `GET /health` - Health check, including backing store reachability
//! - `GET /count` - Number of keys in the cache namespace
//! - `DELETE /purge` - Delete every key in the cache namespace
//! - `POST /invalidate/sets` - Invalidate entries depending on entity sets
//! - `POST /invalidate/item` - Invalidate one entry
//! - `GET /stats` - Per-key statistics
//! - `GET /stats/sets` - Per entity-set invalidation counts

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
