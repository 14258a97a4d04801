//! Index Repair Task
//!
//! Background task that periodically prunes entity-set indexes.
//!
//! Entries carrying an absolute expiration are reclaimed by the store's own
//! key expiry, which leaves their storage key behind in every index they
//! belonged to. Invalidation tolerates such members; this task keeps the
//! index sets from growing without bound.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;

/// Spawns a background task that prunes dangling index members every
/// `repair_interval_secs` seconds.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let repair_handle = spawn_repair_task(cache.clone(), 60);
/// // Later, during shutdown:
/// repair_handle.abort();
/// ```
pub fn spawn_repair_task(cache: QueryCache, repair_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(repair_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting index repair task with interval of {} seconds",
            repair_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.repair_indexes().await {
                Ok(0) => debug!("Index repair: no dangling members found"),
                Ok(pruned) => info!("Index repair: removed {} dangling members", pruned),
                Err(err) => warn!(error = %err, "Index repair failed, retrying next interval"),
            }
        }
    })
}
