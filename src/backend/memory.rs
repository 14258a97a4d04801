//! In-Memory Backend
//!
//! A [`Backend`] held in process memory. Each scripted operation runs inside
//! one critical section, which gives it the same atomicity as the Redis
//! scripts. Used by tests and local development, with switches to simulate
//! an unreachable store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Backend, PutEntry};
use crate::cache::decode;
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, StoredValue>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryState {
    fn value(&mut self, key: &str) -> Option<&StoredValue> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|v| !v.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key)
    }

    fn exists(&mut self, key: &str) -> bool {
        self.value(key).is_some()
            || self.sets.contains_key(key)
            || self.hashes.contains_key(key)
    }

    fn set_remove(&mut self, key: &str, member: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.sets.remove(key);
            }
        }
    }

    fn entity_sets_of(&mut self, entry_key: &str) -> Vec<String> {
        self.value(entry_key)
            .and_then(|stored| decode(&stored.bytes).ok().flatten())
            .map(|entry| entry.entity_sets)
            .unwrap_or_default()
    }

    fn delete(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let value = self
            .values
            .remove(key)
            .is_some_and(|stored| stored.is_live(now));
        let set = self.sets.remove(key).is_some();
        let hash = self.hashes.remove(key).is_some();
        value || set || hash
    }
}

// == Memory Backend ==
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
    failures_pending: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Number of members in the set stored at `key`.
    pub async fn raw_set_len(&self, key: &str) -> usize {
        self.state.lock().await.sets.get(key).map_or(0, HashSet::len)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "memory backend switched off".to_string(),
            ));
        }

        let took_failure = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took_failure {
            return Err(CacheError::Unavailable(
                "injected memory backend failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.value(key).map(|stored| stored.bytes.clone()))
    }

    async fn touch_entry(
        &self,
        key: &str,
        expected: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.value(key).map(|stored| stored.bytes.as_slice()) != Some(expected) {
            return Ok(false);
        }
        if let Some(stored) = state.values.get_mut(key) {
            stored.bytes = value.to_vec();
            if let Some(ttl) = ttl {
                stored.expires_at = Some(Instant::now() + ttl);
            }
        }
        Ok(true)
    }

    async fn put_entry(&self, put: PutEntry<'_>) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        for name in state.entity_sets_of(put.entry_key) {
            let index_key = format!("{}{}", put.index_prefix, name);
            if !put.index_keys.contains(&index_key) {
                state.set_remove(&index_key, put.member);
            }
        }

        for index_key in put.index_keys {
            state
                .sets
                .entry(index_key.clone())
                .or_default()
                .insert(put.member.to_string());
        }

        state.values.insert(
            put.entry_key.to_string(),
            StoredValue {
                bytes: put.payload.to_vec(),
                expires_at: put.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn remove_entry(
        &self,
        entry_key: &str,
        member: &str,
        index_keys: &[String],
    ) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        for index_key in index_keys {
            state.set_remove(index_key, member);
        }
        Ok(state.delete(entry_key))
    }

    async fn sweep_indexes(
        &self,
        index_keys: &[String],
        entry_prefix: &str,
        index_prefix: &str,
    ) -> Result<Vec<String>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let mut seen = HashSet::new();
        let mut removed = Vec::new();

        for index_key in index_keys {
            let mut members: Vec<String> = state
                .sets
                .get(index_key)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            members.sort();

            for member in members {
                if !seen.insert(member.clone()) {
                    continue;
                }
                let entry_key = format!("{entry_prefix}{member}");
                for name in state.entity_sets_of(&entry_key) {
                    state.set_remove(&format!("{index_prefix}{name}"), &member);
                }
                if state.delete(&entry_key) {
                    removed.push(member);
                }
            }
            state.sets.remove(index_key);
        }
        Ok(removed)
    }

    async fn prune_index(&self, index_key: &str, entry_prefix: &str) -> Result<u64> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let members: Vec<String> = state
            .sets
            .get(index_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut pruned = 0;
        for member in members {
            if state.value(&format!("{entry_prefix}{member}")).is_none() {
                state.set_remove(index_key, &member);
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.check_available()?;
        self.state.lock().await.set_remove(key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let slot = state
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".to_string());
        let current: i64 = slot.parse().map_err(|_| {
            CacheError::Script(format!("hash value at {key}.{field} is not an integer"))
        })?;
        *slot = (current + delta).to_string();
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        let now = Instant::now();

        let mut keys: Vec<String> = state
            .values
            .iter()
            .filter(|(_, stored)| stored.is_live(now))
            .map(|(key, _)| key)
            .chain(state.sets.keys())
            .chain(state.hashes.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(keys.iter().filter(|key| state.delete(key)).count() as u64)
    }

    async fn lock_acquire(&self, keys: &[String], token: &str, lease: Duration) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if keys.iter().any(|key| state.exists(key)) {
            return Ok(false);
        }

        let expires_at = Some(Instant::now() + lease);
        for key in keys {
            state.values.insert(
                key.clone(),
                StoredValue {
                    bytes: token.as_bytes().to_vec(),
                    expires_at,
                },
            );
        }
        Ok(true)
    }

    async fn lock_release(&self, keys: &[String], token: &str) -> Result<u64> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let mut released = 0;
        for key in keys {
            let held = state
                .value(key)
                .is_some_and(|stored| stored.bytes == token.as_bytes());
            if held {
                state.values.remove(key);
                released += 1;
            }
        }
        Ok(released)
    }
}
