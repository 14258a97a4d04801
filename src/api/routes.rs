//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    count_handler, entity_set_stats_handler, health_handler, invalidate_item_handler,
    invalidate_sets_handler, purge_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/count", get(count_handler))
        .route("/purge", delete(purge_handler))
        .route("/invalidate/sets", post(invalidate_sets_handler))
        .route("/invalidate/item", post(invalidate_item_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/sets", get(entity_set_stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
