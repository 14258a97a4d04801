//! Cache Statistics Module
//!
//! Tracks hits, misses and invalidations per storage key, plus the original
//! key each storage key was derived from. Counters live in the backing store
//! so every process feeding the cache contributes to them. They are advisory:
//! recording failures are logged and never fail the cache operation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::backend::Backend;
use crate::cache::Keyspace;
use crate::error::Result;

const HITS: &str = "hits";
const MISSES: &str = "misses";
const INVALIDATIONS: &str = "invalidations";
const QUERY: &str = "query";

// == Key Statistics ==
/// Counters for one storage key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyStatistics {
    pub storage_key: String,
    /// Logical key last seen for this storage key
    pub query: Option<String>,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl KeyStatistics {
    fn from_fields(storage_key: String, mut fields: HashMap<String, String>) -> Self {
        let counter = |name: &str| -> u64 {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        let hits = counter(HITS);
        let misses = counter(MISSES);
        let invalidations = counter(INVALIDATIONS);

        Self {
            storage_key,
            query: fields.remove(QUERY),
            hits,
            misses,
            invalidations,
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if the key was never read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Invalidation count for one entity set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySetStatistics {
    pub entity_set: String,
    pub invalidations: u64,
}

// == Statistics Tracker ==
#[derive(Clone)]
pub struct StatisticsTracker {
    backend: Arc<dyn Backend>,
    keyspace: Keyspace,
}

impl StatisticsTracker {
    pub fn new(backend: Arc<dyn Backend>, keyspace: Keyspace) -> Self {
        Self { backend, keyspace }
    }

    /// Records a read of `storage_key`, derived from `logical_key`.
    pub async fn record_access(&self, storage_key: &str, logical_key: &str, hit: bool) {
        let stats_key = self.keyspace.key_stats(storage_key);
        let counter = if hit { HITS } else { MISSES };

        let result = async {
            self.backend
                .set_add(&self.keyspace.stats_registry(), storage_key)
                .await?;
            self.backend.hash_set(&stats_key, QUERY, logical_key).await?;
            self.backend.hash_incr(&stats_key, counter, 1).await
        }
        .await;

        if let Err(err) = result {
            warn!(storage_key, error = %err, "Failed to record access statistics");
        }
    }

    /// Records invalidations of storage keys and, for set-wide invalidation,
    /// of the entity sets swept.
    pub async fn record_invalidation(&self, storage_keys: &[String], entity_sets: &[String]) {
        let result = async {
            for storage_key in storage_keys {
                self.backend
                    .set_add(&self.keyspace.stats_registry(), storage_key)
                    .await?;
                self.backend
                    .hash_incr(&self.keyspace.key_stats(storage_key), INVALIDATIONS, 1)
                    .await?;
            }
            for entity_set in entity_sets {
                self.backend
                    .hash_incr(&self.keyspace.entity_set_stats(), entity_set, 1)
                    .await?;
            }
            Ok::<_, crate::error::CacheError>(())
        }
        .await;

        if let Err(err) = result {
            warn!(error = %err, "Failed to record invalidation statistics");
        }
    }

    /// Counters for every tracked storage key, sorted by storage key.
    pub async fn key_statistics(&self) -> Result<Vec<KeyStatistics>> {
        let mut storage_keys = self
            .backend
            .set_members(&self.keyspace.stats_registry())
            .await?;
        storage_keys.sort();

        let mut statistics = Vec::with_capacity(storage_keys.len());
        for storage_key in storage_keys {
            let fields = self
                .backend
                .hash_get_all(&self.keyspace.key_stats(&storage_key))
                .await?;
            statistics.push(KeyStatistics::from_fields(storage_key, fields));
        }
        Ok(statistics)
    }

    /// Invalidation counts per entity set, sorted by name.
    pub async fn entity_set_statistics(&self) -> Result<Vec<EntitySetStatistics>> {
        let fields = self
            .backend
            .hash_get_all(&self.keyspace.entity_set_stats())
            .await?;

        let mut statistics: Vec<EntitySetStatistics> = fields
            .into_iter()
            .map(|(entity_set, count)| EntitySetStatistics {
                entity_set,
                invalidations: count.parse().unwrap_or(0),
            })
            .collect();
        statistics.sort_by(|a, b| a.entity_set.cmp(&b.entity_set));
        Ok(statistics)
    }
}
