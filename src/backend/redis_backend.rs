//! Redis Backend
//!
//! [`Backend`] over a multiplexed, auto-reconnecting Redis connection. The
//! scripts are owned by the backend instance; `Script` caches their SHA and
//! falls back to loading them when the server does not know it yet.
//!
//! Requires a single Redis instance: the put and sweep scripts build key names
//! from prefixes inside Lua, which Redis Cluster rejects.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use tracing::{debug, info};

use super::scripts;
use super::{Backend, PutEntry};
use crate::error::{CacheError, Result};

/// Keys requested per SCAN round and deleted per DEL.
const BATCH_SIZE: usize = 500;

struct Scripts {
    touch_entry: Script,
    put_entry: Script,
    remove_entry: Script,
    sweep_indexes: Script,
    prune_index: Script,
    lock_acquire: Script,
    lock_release: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            touch_entry: Script::new(scripts::TOUCH_ENTRY),
            put_entry: Script::new(scripts::PUT_ENTRY),
            remove_entry: Script::new(scripts::REMOVE_ENTRY),
            sweep_indexes: Script::new(scripts::SWEEP_INDEXES),
            prune_index: Script::new(scripts::PRUNE_INDEX),
            lock_acquire: Script::new(scripts::LOCK_ACQUIRE),
            lock_release: Script::new(scripts::LOCK_RELEASE),
        }
    }
}

// == Redis Backend ==
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    timeout: Duration,
    scripts: Arc<Scripts>,
}

impl RedisBackend {
    /// Connects to `url`, bounding the initial handshake by `timeout`.
    ///
    /// `timeout` also bounds every later call; an elapsed call is reported as
    /// [`CacheError::Unavailable`] because its outcome is unknown.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|err| CacheError::Config(err.to_string()))?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Unavailable(format!("connecting to {url} timed out")))??;

        info!(url = %url, "Connected to Redis");
        Ok(Self::new(connection, timeout))
    }

    pub fn new(connection: ConnectionManager, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
            scripts: Arc::new(Scripts::load()),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = RedisResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => {
                debug!(operation, timeout = ?self.timeout, "Redis call timed out");
                Err(CacheError::Unavailable(format!(
                    "{operation} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        self.bounded("GET", conn.get(key)).await
    }

    async fn touch_entry(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let mut invocation = self.scripts.touch_entry.key(key);
        invocation.arg(expected).arg(value).arg(ttl_millis(ttl));

        let mut conn = self.connection.clone();
        let written: i64 = self
            .bounded("touch_entry", invocation.invoke_async(&mut conn))
            .await?;
        Ok(written == 1)
    }

    async fn put_entry(&self, put: PutEntry<'_>) -> Result<()> {
        let ttl_ms = ttl_millis(put.ttl);

        let mut invocation = self.scripts.put_entry.prepare_invoke();
        invocation.key(put.entry_key);
        for index_key in put.index_keys {
            invocation.key(index_key);
        }
        invocation
            .arg(put.member)
            .arg(put.payload)
            .arg(ttl_ms)
            .arg(put.index_prefix);

        let mut conn = self.connection.clone();
        let _: i64 = self
            .bounded("put_entry", invocation.invoke_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn remove_entry(
        &self,
        entry_key: &str,
        member: &str,
        index_keys: &[String],
    ) -> Result<bool> {
        let mut invocation = self.scripts.remove_entry.prepare_invoke();
        invocation.key(entry_key);
        for index_key in index_keys {
            invocation.key(index_key);
        }
        invocation.arg(member);

        let mut conn = self.connection.clone();
        let deleted: i64 = self
            .bounded("remove_entry", invocation.invoke_async(&mut conn))
            .await?;
        Ok(deleted > 0)
    }

    async fn sweep_indexes(
        &self,
        index_keys: &[String],
        entry_prefix: &str,
        index_prefix: &str,
    ) -> Result<Vec<String>> {
        if index_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut invocation = self.scripts.sweep_indexes.prepare_invoke();
        for index_key in index_keys {
            invocation.key(index_key);
        }
        invocation.arg(entry_prefix).arg(index_prefix);

        let mut conn = self.connection.clone();
        self.bounded("sweep_indexes", invocation.invoke_async(&mut conn))
            .await
    }

    async fn prune_index(&self, index_key: &str, entry_prefix: &str) -> Result<u64> {
        let mut invocation = self.scripts.prune_index.key(index_key);
        invocation.arg(entry_prefix);

        let mut conn = self.connection.clone();
        self.bounded("prune_index", invocation.invoke_async(&mut conn))
            .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded("SADD", conn.sadd(key, member)).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded("SREM", conn.srem(key, member)).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        self.bounded("SMEMBERS", conn.smembers(key)).await
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded("HINCRBY", conn.hincr(key, field, delta)).await?;
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded("HSET", conn.hset(key, field, value)).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        self.bounded("HGETALL", conn.hgetall(key)).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .bounded(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(BATCH_SIZE)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut conn = self.connection.clone();
        let mut deleted = 0;
        for chunk in keys.chunks(BATCH_SIZE) {
            let removed: u64 = self.bounded("DEL", conn.del(chunk)).await?;
            deleted += removed;
        }
        Ok(deleted)
    }

    async fn lock_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool> {
        let mut invocation = self.scripts.lock_acquire.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation
            .arg(token)
            .arg(u64::try_from(lease.as_millis()).unwrap_or(u64::MAX));

        let mut conn = self.connection.clone();
        let acquired: i64 = self
            .bounded("lock_acquire", invocation.invoke_async(&mut conn))
            .await?;
        Ok(acquired == 1)
    }

    async fn lock_release(&self, keys: &[String], token: &str) -> Result<u64> {
        let mut invocation = self.scripts.lock_release.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        invocation.arg(token);

        let mut conn = self.connection.clone();
        self.bounded("lock_release", invocation.invoke_async(&mut conn))
            .await
    }
}

/// Milliseconds for a PX argument; 0 means no expiry, anything else is at least 1.
fn ttl_millis(ttl: Option<Duration>) -> u64 {
    ttl.map_or(0, |ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// Escapes glob metacharacters so a literal prefix can be used with MATCH.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
