//! Query Cache Module
//!
//! The cache facade: reads, writes and invalidation on top of the backend,
//! with failures routed through the notification channel.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{Backend, PutEntry};
use crate::cache::failure::{CacheFailure, FailureChannel, Operation};
use crate::cache::{
    current_time, decode, encode, hash_key, CacheEntry, EntitySetIndex, EntitySetStatistics,
    KeyStatistics, Keyspace, RetryPolicy, StatisticsTracker,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::lock::{LockHandle, LockProvider};

// == Query Cache ==
/// Query result cache with entity-set invalidation.
///
/// Cheap to clone; clones share the backend connection, the lock provider
/// and the failure channel.
///
/// Failure handling: while at least one receiver from [`QueryCache::subscribe`]
/// is alive, store failures are sent there and the operation degrades (a
/// read becomes a miss, a write or invalidation becomes a no-op). Without a
/// subscriber they are returned as errors. Invalidation is retried before it
/// is reported.
#[derive(Clone)]
pub struct QueryCache {
    backend: Arc<dyn Backend>,
    keyspace: Keyspace,
    index: EntitySetIndex,
    statistics: Option<StatisticsTracker>,
    retry: RetryPolicy,
    locks: Arc<dyn LockProvider>,
    failures: FailureChannel,
}

impl QueryCache {
    // == Constructor ==
    pub fn new(
        backend: Arc<dyn Backend>,
        locks: Arc<dyn LockProvider>,
        config: CacheConfig,
    ) -> Self {
        let keyspace = Keyspace::new(config.namespace);
        let statistics = config
            .collect_statistics
            .then(|| StatisticsTracker::new(backend.clone(), keyspace.clone()));

        Self {
            index: EntitySetIndex::new(backend.clone(), keyspace.clone()),
            backend,
            keyspace,
            statistics,
            retry: RetryPolicy::new(config.retry_delays),
            locks,
            failures: FailureChannel::new(config.failure_channel_capacity),
        }
    }

    /// Receives every failure reported from now on. Holding a receiver
    /// switches the cache to degraded mode (see the type docs). A receiver
    /// that falls behind gets `RecvError::Lagged` for the reports it lost; see
    /// [`FailureChannel`].
    pub fn subscribe(&self) -> broadcast::Receiver<CacheFailure> {
        self.failures.subscribe()
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn index(&self) -> &EntitySetIndex {
        &self.index
    }

    pub fn statistics_enabled(&self) -> bool {
        self.statistics.is_some()
    }

    // == Get ==
    /// Returns the cached value for `key`, or `None` on a miss.
    ///
    /// Expired entries are invalidated and reported as misses. A hit on an
    /// entry with an expiration refreshes its last access time.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let storage_key = hash_key(key)?;
        let entry_key = self.keyspace.entry(&storage_key);

        let bytes = match self.backend.get(&entry_key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.failures
                    .report(CacheFailure::new(Operation::Get, key, err))?;
                return Ok(None);
            }
        };

        let entry = match bytes.as_deref().map(decode) {
            None | Some(Ok(None)) => None,
            Some(Ok(Some(entry))) => Some(entry),
            Some(Err(err)) => {
                warn!(storage_key, error = %err, "Discarding undecodable entry");
                self.record_access(&storage_key, key, false).await;
                self.discard(key, &storage_key).await?;
                return Ok(None);
            }
        };

        let Some(mut entry) = entry else {
            debug!(storage_key, "Cache miss");
            self.record_access(&storage_key, key, false).await;
            return Ok(None);
        };

        if entry.never_expires() {
            debug!(storage_key, "Cache hit");
            self.record_access(&storage_key, key, true).await;
            return Ok(Some(entry.value));
        }

        let now = current_time();
        if entry.is_expired_at(now) {
            debug!(storage_key, "Cache entry expired");
            self.record_access(&storage_key, key, false).await;
            self.discard(key, &storage_key).await?;
            return Ok(None);
        }

        entry.touch(now);
        let read = bytes.unwrap_or_default();
        self.write_back(key, &entry_key, &read, &entry).await;

        debug!(storage_key, "Cache hit");
        self.record_access(&storage_key, key, true).await;
        Ok(Some(entry.value))
    }

    // == Put ==
    /// Stores `value` under `key`, indexed by every name in `entity_sets`.
    ///
    /// `None` expirations disable that kind of expiry; with both `None` the
    /// entry lives until invalidated.
    pub async fn put<S: AsRef<str>>(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
        entity_sets: &[S],
        sliding_expiration: Option<TimeDelta>,
        absolute_expiration: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let storage_key = hash_key(key)?;
        let entity_sets = normalize_entity_sets(entity_sets)?;
        let entry = CacheEntry::new(
            value.into(),
            entity_sets,
            sliding_expiration,
            absolute_expiration,
        );

        if let Err(err) = self.store(&storage_key, &entry).await {
            self.failures
                .report(CacheFailure::new(Operation::Put, key, err))?;
        }
        Ok(())
    }

    // == Invalidate Item ==
    /// Removes the entry for `key` and its index memberships. Invalidating a
    /// missing key is a no-op. Also accepts a storage key.
    pub async fn invalidate_item(&self, key: &str) -> Result<()> {
        let storage_key = hash_key(key)?;
        self.discard(key, &storage_key).await
    }

    // == Invalidate Sets ==
    /// Invalidates every entry that depends on any of `entity_sets`, as one
    /// atomic sweep. Returns the storage keys removed.
    pub async fn invalidate_sets<S: AsRef<str>>(&self, entity_sets: &[S]) -> Result<Vec<String>> {
        let entity_sets = normalize_entity_sets(entity_sets)?;
        if entity_sets.is_empty() {
            return Ok(Vec::new());
        }

        let index_keys: Vec<String> = entity_sets
            .iter()
            .map(|name| self.keyspace.index(name))
            .collect();
        let entry_prefix = self.keyspace.entry_prefix();
        let index_prefix = self.keyspace.index_prefix();

        let (backend, index_keys, entry_prefix, index_prefix) =
            (&self.backend, &index_keys, &entry_prefix, &index_prefix);
        let result = self
            .retry
            .run("invalidate_sets", move || {
                backend.sweep_indexes(index_keys, entry_prefix, index_prefix)
            })
            .await;

        match result {
            Ok(removed) => {
                info!(?entity_sets, removed = removed.len(), "Invalidated entity sets");
                if let Some(statistics) = &self.statistics {
                    statistics.record_invalidation(&removed, &entity_sets).await;
                }
                Ok(removed)
            }
            Err(err) => {
                self.failures.report(CacheFailure::new(
                    Operation::InvalidateSets,
                    entity_sets.join(","),
                    err,
                ))?;
                Ok(Vec::new())
            }
        }
    }

    /// [`QueryCache::invalidate_sets`] while holding the lock on the same
    /// entity sets. The lock is released on every exit path.
    pub async fn invalidate_sets_locked<S: AsRef<str>>(
        &self,
        entity_sets: &[S],
    ) -> Result<Vec<String>> {
        let entity_sets = normalize_entity_sets(entity_sets)?;
        if entity_sets.is_empty() {
            return Ok(Vec::new());
        }

        let handle = self.locks.acquire(&entity_sets).await?;
        let result = self.invalidate_sets(entity_sets.as_slice()).await;
        if let Err(err) = self.locks.release(&handle).await {
            warn!(?entity_sets, error = %err, "Lock release failed, lease will reclaim it");
        }
        result
    }

    // == Locks ==
    /// Locks resources (usually entity-set names) across processes.
    pub async fn lock<S: AsRef<str>>(&self, resources: &[S]) -> Result<LockHandle> {
        let resources: Vec<String> = resources.iter().map(|r| r.as_ref().to_string()).collect();
        self.locks.acquire(&resources).await
    }

    pub async fn unlock(&self, handle: &LockHandle) -> Result<()> {
        self.locks.release(handle).await
    }

    /// Round trip to the backing store.
    pub async fn ping(&self) -> Result<()> {
        self.backend.get(&self.keyspace.prefix()).await.map(|_| ())
    }

    // == Count ==
    /// Number of keys in the namespace, including index and statistics keys.
    pub async fn count(&self) -> Result<u64> {
        let keys = self.backend.scan_prefix(&self.keyspace.prefix()).await?;
        Ok(keys.len() as u64)
    }

    // == Purge ==
    /// Deletes every key in the namespace. Returns how many were deleted.
    pub async fn purge(&self) -> Result<u64> {
        let keys = self.backend.scan_prefix(&self.keyspace.prefix()).await?;
        let removed = self.backend.delete(&keys).await?;
        info!(namespace = self.keyspace.namespace(), removed, "Purged cache namespace");
        Ok(removed)
    }

    // == Repair Indexes ==
    /// Removes index members whose entry is gone. Returns how many were removed.
    pub async fn repair_indexes(&self) -> Result<u64> {
        let mut pruned = 0;
        for entity_set in self.index.entity_sets().await? {
            pruned += self.index.prune(&entity_set).await?;
        }
        Ok(pruned)
    }

    // == Statistics ==
    /// Per-key counters, empty when statistics are disabled.
    pub async fn statistics(&self) -> Result<Vec<KeyStatistics>> {
        match &self.statistics {
            Some(statistics) => statistics.key_statistics().await,
            None => Ok(Vec::new()),
        }
    }

    /// Per entity-set invalidation counts, empty when statistics are disabled.
    pub async fn entity_set_statistics(&self) -> Result<Vec<EntitySetStatistics>> {
        match &self.statistics {
            Some(statistics) => statistics.entity_set_statistics().await,
            None => Ok(Vec::new()),
        }
    }

    // == Internals ==
    async fn store(&self, storage_key: &str, entry: &CacheEntry) -> Result<()> {
        let payload = encode(Some(entry))?;
        let index_keys: Vec<String> = entry
            .entity_sets
            .iter()
            .map(|name| self.keyspace.index(name))
            .collect();

        self.backend
            .put_entry(PutEntry {
                entry_key: &self.keyspace.entry(storage_key),
                member: storage_key,
                payload: &payload,
                index_keys: &index_keys,
                index_prefix: &self.keyspace.index_prefix(),
                ttl: entry.store_ttl(entry.last_access),
            })
            .await?;

        debug!(storage_key, entity_sets = ?entry.entity_sets, "Stored entry");
        Ok(())
    }

    /// Persists the refreshed access time and restarts the key expiry.
    /// Writes only if the key still holds the bytes the read returned, so an
    /// entry invalidated or re-put in between is left alone.
    async fn write_back(&self, key: &str, entry_key: &str, read: &[u8], entry: &CacheEntry) {
        let result = match encode(Some(entry)) {
            Ok(payload) => {
                self.backend
                    .touch_entry(entry_key, read, &payload, entry.store_ttl(entry.last_access))
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(true) => {}
            Ok(false) => debug!(entry_key, "Entry changed before access time write-back"),
            Err(err) => self
                .failures
                .notify(CacheFailure::new(Operation::Touch, key, err)),
        }
    }

    /// Invalidates a storage key, reporting failure after retries.
    async fn discard(&self, key: &str, storage_key: &str) -> Result<()> {
        if let Err(err) = self.invalidate_storage_key(storage_key).await {
            self.failures
                .report(CacheFailure::new(Operation::InvalidateItem, key, err))?;
        }
        Ok(())
    }

    async fn invalidate_storage_key(&self, storage_key: &str) -> Result<bool> {
        let removed = self
            .retry
            .run("invalidate_item", move || self.remove_entry(storage_key))
            .await?;

        if removed {
            debug!(storage_key, "Invalidated entry");
            if let Some(statistics) = &self.statistics {
                statistics
                    .record_invalidation(&[storage_key.to_string()], &[])
                    .await;
            }
        }
        Ok(removed)
    }

    async fn remove_entry(&self, storage_key: &str) -> Result<bool> {
        let entry_key = self.keyspace.entry(storage_key);
        let Some(bytes) = self.backend.get(&entry_key).await? else {
            return Ok(false);
        };

        // An undecodable entry is deleted without its memberships; index
        // repair drops the members left behind.
        let index_keys: Vec<String> = match decode(&bytes) {
            Ok(Some(entry)) => entry
                .entity_sets
                .iter()
                .map(|name| self.keyspace.index(name))
                .collect(),
            Ok(None) | Err(_) => Vec::new(),
        };

        self.backend
            .remove_entry(&entry_key, storage_key, &index_keys)
            .await
    }

    async fn record_access(&self, storage_key: &str, key: &str, hit: bool) {
        if let Some(statistics) = &self.statistics {
            statistics.record_access(storage_key, key, hit).await;
        }
    }
}

/// Validates entity-set names and drops duplicates, keeping first occurrence order.
fn normalize_entity_sets<S: AsRef<str>>(entity_sets: &[S]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(entity_sets.len());
    for name in entity_sets {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Entity set names cannot be empty".to_string(),
            ));
        }
        if !normalized.iter().any(|existing| existing == name) {
            normalized.push(name.to_string());
        }
    }
    Ok(normalized)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::backend::MemoryBackend;
    use crate::lock::{LocalLocks, LockConfig};

    const NO_SETS: &[&str] = &[];

    fn config(collect_statistics: bool) -> CacheConfig {
        CacheConfig {
            namespace: "t".to_string(),
            collect_statistics,
            retry_delays: vec![Duration::from_millis(1); 3],
            ..CacheConfig::default()
        }
    }

    fn cache_on(backend: &MemoryBackend, collect_statistics: bool) -> QueryCache {
        QueryCache::new(
            Arc::new(backend.clone()),
            Arc::new(LocalLocks::new(LockConfig {
                wait: Duration::from_millis(50),
                retry_delay: Duration::from_millis(5),
                ..LockConfig::default()
            })),
            config(collect_statistics),
        )
    }

    #[test]
    fn test_normalize_entity_sets() {
        assert_eq!(
            normalize_entity_sets(&["B", "A", "B"]).unwrap(),
            vec!["B".to_string(), "A".to_string()]
        );
        assert!(normalize_entity_sets(NO_SETS).unwrap().is_empty());
        assert!(matches!(
            normalize_entity_sets(&["A", ""]),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_caller_errors_fail_before_io() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        let cache = cache_on(&backend, false);
        let _subscriber = cache.subscribe();

        assert!(matches!(
            cache.get("").await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.put("", b"v".to_vec(), NO_SETS, None, None).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.put("k", b"v".to_vec(), &[""], None, None).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.invalidate_item("").await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_reput_moves_index_membership() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);

        cache.put("q", b"v1".to_vec(), &["A", "B"], None, None).await.unwrap();
        cache.put("q", b"v2".to_vec(), &["B", "C"], None, None).await.unwrap();

        assert!(cache.index().members("A").await.unwrap().is_empty());
        assert!(cache.index().members("B").await.unwrap().contains("q"));
        assert!(cache.index().members("C").await.unwrap().contains("q"));

        cache.invalidate_sets(&["A"]).await.unwrap();
        assert_eq!(cache.get("q").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_invalidate_item_unlinks_every_index() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);

        cache.put("q", b"v".to_vec(), &["A", "B"], None, None).await.unwrap();
        cache.invalidate_item("q").await.unwrap();

        assert_eq!(cache.get("q").await.unwrap(), None);
        assert_eq!(backend.raw_set_len("t:set:A").await, 0);
        assert_eq!(backend.raw_set_len("t:set:B").await, 0);
    }

    #[tokio::test]
    async fn test_long_keys_are_hashed_consistently() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        let query = format!("SELECT * FROM t WHERE c IN ({})", "?,".repeat(100));

        cache.put(&query, b"rows".to_vec(), &["T"], None, None).await.unwrap();
        let storage_key = hash_key(&query).unwrap();

        assert!(cache.index().members("T").await.unwrap().contains(&storage_key));
        assert_eq!(cache.get(&query).await.unwrap(), Some(b"rows".to_vec()));

        cache.invalidate_item(&storage_key).await.unwrap();
        assert_eq!(cache.get(&query).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidation_retries_transient_failures() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        cache.put("q", b"v".to_vec(), &["A"], None, None).await.unwrap();

        backend.fail_next(2);
        cache.invalidate_sets(&["A"]).await.unwrap();
        assert_eq!(cache.get("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidation_failure_without_subscriber_is_returned() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        backend.set_unavailable(true);

        match cache.invalidate_sets(&["A"]).await {
            Err(CacheError::RetriesExhausted { failures, .. }) => assert_eq!(failures.len(), 4),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(matches!(
            cache.invalidate_item("q").await,
            Err(CacheError::RetriesExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidation_failure_with_subscriber_is_delivered() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        let mut failures = cache.subscribe();
        backend.set_unavailable(true);

        assert!(cache.invalidate_sets(&["A", "B"]).await.unwrap().is_empty());

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.operation, Operation::InvalidateSets);
        assert_eq!(failure.key.as_deref(), Some("A,B"));
        assert!(matches!(failure.error, CacheError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn test_get_failure_without_subscriber_is_returned() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        backend.set_unavailable(true);

        assert!(matches!(
            cache.get("q").await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_hit_refreshes_sliding_window() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        cache
            .put("q", b"v".to_vec(), NO_SETS, Some(TimeDelta::milliseconds(300)), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get("q").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get("q").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(cache.get("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lapsed_sliding_entry_is_reclaimed() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        cache
            .put("q", b"v".to_vec(), &["A"], Some(TimeDelta::milliseconds(20)), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.get("t:entry:q").await.unwrap(), None);

        assert_eq!(cache.repair_indexes().await.unwrap(), 1);
        assert_eq!(cache.count().await.unwrap(), 0);
    }

    /// Delegates to a memory backend, but lets another writer invalidate and
    /// re-put `q` right before the first access time write-back lands.
    struct WriterFirstBackend {
        inner: MemoryBackend,
        writer: QueryCache,
        fired: AtomicBool,
    }

    #[async_trait]
    impl Backend for WriterFirstBackend {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn touch_entry(
            &self,
            key: &str,
            expected: &[u8],
            value: &[u8],
            ttl: Option<Duration>,
        ) -> Result<bool> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.writer.invalidate_sets(&["A"]).await?;
                self.writer
                    .put("q", b"v2".to_vec(), &["B"], Some(TimeDelta::seconds(60)), None)
                    .await?;
            }
            self.inner.touch_entry(key, expected, value, ttl).await
        }

        async fn put_entry(&self, put: PutEntry<'_>) -> Result<()> {
            self.inner.put_entry(put).await
        }

        async fn remove_entry(
            &self,
            entry_key: &str,
            member: &str,
            index_keys: &[String],
        ) -> Result<bool> {
            self.inner.remove_entry(entry_key, member, index_keys).await
        }

        async fn sweep_indexes(
            &self,
            index_keys: &[String],
            entry_prefix: &str,
            index_prefix: &str,
        ) -> Result<Vec<String>> {
            self.inner
                .sweep_indexes(index_keys, entry_prefix, index_prefix)
                .await
        }

        async fn prune_index(&self, index_key: &str, entry_prefix: &str) -> Result<u64> {
            self.inner.prune_index(index_key, entry_prefix).await
        }

        async fn set_add(&self, key: &str, member: &str) -> Result<()> {
            self.inner.set_add(key, member).await
        }

        async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
            self.inner.set_remove(key, member).await
        }

        async fn set_members(&self, key: &str) -> Result<Vec<String>> {
            self.inner.set_members(key).await
        }

        async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<()> {
            self.inner.hash_incr(key, field, delta).await
        }

        async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
            self.inner.hash_set(key, field, value).await
        }

        async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
            self.inner.hash_get_all(key).await
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.scan_prefix(prefix).await
        }

        async fn delete(&self, keys: &[String]) -> Result<u64> {
            self.inner.delete(keys).await
        }

        async fn lock_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool> {
            self.inner.lock_acquire(keys, token, lease).await
        }

        async fn lock_release(&self, keys: &[String], token: &str) -> Result<u64> {
            self.inner.lock_release(keys, token).await
        }
    }

    #[tokio::test]
    async fn test_write_back_never_overwrites_newer_entry() {
        let inner = MemoryBackend::new();
        let writer = cache_on(&inner, false);
        let reader = QueryCache::new(
            Arc::new(WriterFirstBackend {
                inner: inner.clone(),
                writer: writer.clone(),
                fired: AtomicBool::new(false),
            }),
            Arc::new(LocalLocks::default()),
            config(false),
        );

        reader
            .put("q", b"v1".to_vec(), &["A"], Some(TimeDelta::seconds(60)), None)
            .await
            .unwrap();

        // the read of v1 races the writer; its write-back must not win
        assert_eq!(reader.get("q").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(reader.get("q").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(writer.get("q").await.unwrap(), Some(b"v2".to_vec()));

        let stored = decode(&inner.get("t:entry:q").await.unwrap().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.entity_sets, vec!["B".to_string()]);
        assert!(writer.index().members("A").await.unwrap().is_empty());
        assert!(writer.index().members("B").await.unwrap().contains("q"));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_discarded() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        backend
            .put_entry(PutEntry {
                entry_key: "t:entry:q",
                member: "q",
                payload: b"garbage",
                index_keys: &["t:set:A".to_string()],
                index_prefix: "t:set:",
                ttl: None,
            })
            .await
            .unwrap();

        assert_eq!(cache.get("q").await.unwrap(), None);
        assert_eq!(backend.get("t:entry:q").await.unwrap(), None);

        // the orphaned membership is dropped by repair
        assert_eq!(cache.repair_indexes().await.unwrap(), 1);
        assert!(cache.index().members("A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_invalidation_releases_lock() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        cache.put("q", b"v".to_vec(), &["A"], None, None).await.unwrap();

        let removed = cache.invalidate_sets_locked(&["A"]).await.unwrap();
        assert_eq!(removed, vec!["q".to_string()]);

        let handle = cache.lock(&["A"]).await.unwrap();
        assert!(matches!(
            cache.invalidate_sets_locked(&["A"]).await,
            Err(CacheError::LockUnavailable { .. })
        ));
        cache.unlock(&handle).await.unwrap();
        assert!(cache.invalidate_sets_locked(&["A"]).await.is_ok());
    }

    #[tokio::test]
    async fn test_statistics_follow_reads_and_invalidations() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, true);
        assert!(cache.statistics_enabled());

        cache.get("q").await.unwrap();
        cache.put("q", b"v".to_vec(), &["A"], None, None).await.unwrap();
        cache.get("q").await.unwrap();
        cache.invalidate_sets(&["A"]).await.unwrap();

        let stats = cache.statistics().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].query.as_deref(), Some("q"));
        assert_eq!((stats[0].hits, stats[0].misses, stats[0].invalidations), (1, 1, 1));

        let sets = cache.entity_set_statistics().await.unwrap();
        assert_eq!(sets[0].entity_set, "A");
        assert_eq!(sets[0].invalidations, 1);
    }

    #[tokio::test]
    async fn test_statistics_disabled() {
        let backend = MemoryBackend::new();
        let cache = cache_on(&backend, false);
        cache.get("q").await.unwrap();
        assert!(cache.statistics().await.unwrap().is_empty());
        assert_eq!(cache.count().await.unwrap(), 0);
    }
}
