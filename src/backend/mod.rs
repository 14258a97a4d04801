//! Backend Module
//!
//! The backing store seen by the cache. Every operation that touches an entry
//! together with index sets is a single atomic call on this trait, backed by a
//! Lua script on Redis and by a single critical section in memory.
//!
//! The scripts derive entry and index key names from the prefixes they are
//! given instead of receiving every key in `KEYS`, so a Redis backend must be
//! a single instance (or a replicated primary), not a Redis Cluster.

mod memory;
mod redis_backend;
mod scripts;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

// == Put Entry ==
/// Arguments of the atomic put.
#[derive(Debug, Clone, Copy)]
pub struct PutEntry<'a> {
    /// Full key of the entry
    pub entry_key: &'a str,
    /// Storage key recorded in the index sets
    pub member: &'a str,
    /// Encoded entry
    pub payload: &'a [u8],
    /// Index sets the entry must belong to after the put
    pub index_keys: &'a [String],
    /// Prefix used to resolve index keys of a previous entry at the same key
    pub index_prefix: &'a str,
    /// Expiry for the entry key itself
    pub ttl: Option<Duration>,
}

// == Backend Trait ==
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrites `key` with `value` only while it still holds exactly
    /// `expected`. With a `ttl` the key expiry is reset to it, otherwise the
    /// current expiry is kept. Returns false and writes nothing when the key
    /// is gone or was rewritten in between.
    async fn touch_entry(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Atomically moves the member's index memberships to `index_keys` and
    /// stores the entry.
    async fn put_entry(&self, put: PutEntry<'_>) -> Result<()>;

    /// Atomically removes `member` from every index in `index_keys` and
    /// deletes the entry. Returns whether the entry existed.
    async fn remove_entry(&self, entry_key: &str, member: &str, index_keys: &[String])
        -> Result<bool>;

    /// Atomically invalidates every entry referenced by the given indexes,
    /// unlinking each from all of its indexes, and deletes the swept indexes.
    /// Returns the distinct storage keys whose entry was deleted.
    async fn sweep_indexes(
        &self,
        index_keys: &[String],
        entry_prefix: &str,
        index_prefix: &str,
    ) -> Result<Vec<String>>;

    /// Atomically drops index members whose entry no longer exists.
    async fn prune_index(&self, index_key: &str, entry_prefix: &str) -> Result<u64>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<()>;
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Lists every key starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Sets every key to `token` with a lease, or none of them if any is held.
    async fn lock_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool>;

    /// Deletes the keys still holding `token`. Returns how many were released.
    async fn lock_release(&self, keys: &[String], token: &str) -> Result<u64>;
}
