//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

use crate::cache::QueryCache;
use crate::error::{CacheError, Result};
use crate::models::{
    CountResponse, EntitySetStatsResponse, HealthResponse, InvalidateItemRequest,
    InvalidateItemResponse, InvalidateSetsRequest, InvalidateSetsResponse, PurgeResponse,
    StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: QueryCache,
}

impl AppState {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }
}

/// Handler for GET /health
///
/// Reports 503 with status "degraded" when the backing store is unreachable.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.cache.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(err) => {
            warn!(error = %err, "Health check could not reach the backing store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::degraded()),
            )
        }
    }
}

/// Handler for GET /count
pub async fn count_handler(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    let count = state.cache.count().await?;
    Ok(Json(CountResponse::new(
        state.cache.keyspace().namespace(),
        count,
    )))
}

/// Handler for DELETE /purge
pub async fn purge_handler(State(state): State<AppState>) -> Result<Json<PurgeResponse>> {
    let removed = state.cache.purge().await?;
    Ok(Json(PurgeResponse::new(
        state.cache.keyspace().namespace(),
        removed,
    )))
}

/// Handler for POST /invalidate/sets
///
/// With `lock` set, the sweep runs under the distributed lock for the sets
/// and a busy lock answers 423.
pub async fn invalidate_sets_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateSetsRequest>,
) -> Result<Json<InvalidateSetsResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    let removed = if req.lock {
        state.cache.invalidate_sets_locked(req.entity_sets.as_slice()).await?
    } else {
        state.cache.invalidate_sets(req.entity_sets.as_slice()).await?
    };

    Ok(Json(InvalidateSetsResponse::new(req.entity_sets, removed)))
}

/// Handler for POST /invalidate/item
pub async fn invalidate_item_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateItemRequest>,
) -> Result<Json<InvalidateItemResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    state.cache.invalidate_item(&req.key).await?;
    Ok(Json(InvalidateItemResponse::new(req.key)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let statistics = state.cache.statistics().await?;
    Ok(Json(StatsResponse::new(
        state.cache.statistics_enabled(),
        statistics,
    )))
}

/// Handler for GET /stats/sets
pub async fn entity_set_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<EntitySetStatsResponse>> {
    let statistics = state.cache.entity_set_statistics().await?;
    Ok(Json(EntitySetStatsResponse::new(
        state.cache.statistics_enabled(),
        statistics,
    )))
}
