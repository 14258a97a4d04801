//! Entity-Set Index Module
//!
//! Per entity set, the storage keys of the entries that depend on it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::Backend;
use crate::cache::Keyspace;
use crate::error::Result;

// == Entity Set Index ==
/// Direct access to the index sets.
///
/// Steady-state membership changes happen inside the put and invalidation
/// scripts; these calls are for inspection and repair.
#[derive(Clone)]
pub struct EntitySetIndex {
    backend: Arc<dyn Backend>,
    keyspace: Keyspace,
}

impl EntitySetIndex {
    pub fn new(backend: Arc<dyn Backend>, keyspace: Keyspace) -> Self {
        Self { backend, keyspace }
    }

    /// Adds a storage key to the set. Adding twice is a no-op.
    pub async fn add_member(&self, entity_set: &str, storage_key: &str) -> Result<()> {
        self.backend
            .set_add(&self.keyspace.index(entity_set), storage_key)
            .await
    }

    pub async fn members(&self, entity_set: &str) -> Result<HashSet<String>> {
        let members = self
            .backend
            .set_members(&self.keyspace.index(entity_set))
            .await?;
        Ok(members.into_iter().collect())
    }

    pub async fn remove_member(&self, entity_set: &str, storage_key: &str) -> Result<()> {
        self.backend
            .set_remove(&self.keyspace.index(entity_set), storage_key)
            .await
    }

    /// Deletes the whole set without touching the entries it points at.
    ///
    /// Those entries stay readable until they expire or are invalidated by
    /// key, so this is not an invalidation.
    pub async fn drop_all(&self, entity_set: &str) -> Result<()> {
        self.backend
            .delete(&[self.keyspace.index(entity_set)])
            .await
            .map(|_| ())
    }

    /// Names of every entity set that currently has an index.
    pub async fn entity_sets(&self) -> Result<Vec<String>> {
        let prefix = self.keyspace.index_prefix();
        let keys = self.backend.scan_prefix(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Removes members whose entry no longer exists, one atomic pass per set.
    pub async fn prune(&self, entity_set: &str) -> Result<u64> {
        self.backend
            .prune_index(
                &self.keyspace.index(entity_set),
                &self.keyspace.entry_prefix(),
            )
            .await
    }
}
