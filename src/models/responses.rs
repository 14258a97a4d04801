//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{EntitySetStatistics, KeyStatistics};

/// Response body for the count endpoint (GET /count)
#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub namespace: String,
    /// Keys in the namespace, including index and statistics keys
    pub count: u64,
}

impl CountResponse {
    pub fn new(namespace: impl Into<String>, count: u64) -> Self {
        Self {
            namespace: namespace.into(),
            count,
        }
    }
}

/// Response body for the purge endpoint (DELETE /purge)
#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    /// Success message
    pub message: String,
    /// Number of keys deleted
    pub removed: u64,
}

impl PurgeResponse {
    pub fn new(namespace: &str, removed: u64) -> Self {
        Self {
            message: format!("Namespace '{}' purged", namespace),
            removed,
        }
    }
}

/// Response body for set-wide invalidation (POST /invalidate/sets)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateSetsResponse {
    pub entity_sets: Vec<String>,
    /// Storage keys of the invalidated entries
    pub removed: Vec<String>,
}

impl InvalidateSetsResponse {
    pub fn new(entity_sets: Vec<String>, removed: Vec<String>) -> Self {
        Self {
            entity_sets,
            removed,
        }
    }
}

/// Response body for single-entry invalidation (POST /invalidate/item)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateItemResponse {
    /// Success message
    pub message: String,
    /// The key that was invalidated
    pub key: String,
}

impl InvalidateItemResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' invalidated", key),
            key,
        }
    }
}

/// Counters for one storage key, with its hit rate
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatsEntry {
    #[serde(flatten)]
    pub statistics: KeyStatistics,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<KeyStatistics> for KeyStatsEntry {
    fn from(statistics: KeyStatistics) -> Self {
        Self {
            hit_rate: statistics.hit_rate(),
            statistics,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Whether this cache instance collects statistics
    pub enabled: bool,
    pub keys: Vec<KeyStatsEntry>,
}

impl StatsResponse {
    pub fn new(enabled: bool, statistics: Vec<KeyStatistics>) -> Self {
        Self {
            enabled,
            keys: statistics.into_iter().map(KeyStatsEntry::from).collect(),
        }
    }
}

/// Response body for the entity-set stats endpoint (GET /stats/sets)
#[derive(Debug, Clone, Serialize)]
pub struct EntitySetStatsResponse {
    pub enabled: bool,
    pub entity_sets: Vec<EntitySetStatistics>,
}

impl EntitySetStatsResponse {
    pub fn new(enabled: bool, entity_sets: Vec<EntitySetStatistics>) -> Self {
        Self {
            enabled,
            entity_sets,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the backing store cannot be reached
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self::with_status("healthy")
    }

    pub fn degraded() -> Self {
        Self::with_status("degraded")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
