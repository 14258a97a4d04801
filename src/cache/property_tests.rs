//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key normalization, expiry rules and the
//! entry/index consistency of the cache against a simple model.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};

use crate::backend::MemoryBackend;
use crate::cache::{hash_key, CacheEntry, QueryCache, MAX_PLAIN_KEY_LENGTH};
use crate::config::CacheConfig;
use crate::lock::LocalLocks;

const ENTITY_SETS: [&str; 4] = ["Orders", "Customers", "Products", "Invoices"];

// == Strategies ==
/// Short keys that pass through unchanged
fn plain_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ ]{1,32}"
}

/// Any non-empty key, including ones long enough to be hashed
fn any_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![plain_key_strategy(), "[a-z]{120,300}"]
}

fn entity_sets_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(ENTITY_SETS.to_vec()), 0..3)
        .prop_map(|names| names.into_iter().map(str::to_string).collect())
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, entity_sets: Vec<String> },
    Get { key: String },
    InvalidateItem { key: String },
    InvalidateSets { entity_sets: Vec<String> },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = prop::sample::select(vec!["q1", "q2", "q3", "q4", "q5"]).prop_map(str::to_string);
    prop_oneof![
        (key.clone(), entity_sets_strategy())
            .prop_map(|(key, entity_sets)| CacheOp::Put { key, entity_sets }),
        key.clone().prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::InvalidateItem { key }),
        entity_sets_strategy().prop_map(|entity_sets| CacheOp::InvalidateSets { entity_sets }),
    ]
}

fn new_cache() -> QueryCache {
    QueryCache::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(LocalLocks::default()),
        CacheConfig {
            namespace: "prop".to_string(),
            ..CacheConfig::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storage keys are bounded and normalizing twice changes nothing.
    #[test]
    fn prop_hash_key_bounded_and_idempotent(key in any_key_strategy()) {
        let storage_key = hash_key(&key).unwrap();
        prop_assert!(storage_key.len() < MAX_PLAIN_KEY_LENGTH);
        prop_assert_eq!(hash_key(&storage_key).unwrap(), storage_key.clone());

        if key.len() < MAX_PLAIN_KEY_LENGTH {
            prop_assert_eq!(storage_key, key);
        } else {
            prop_assert_eq!(storage_key.len(), 44);
        }
    }

    // An entry with neither expiration never expires, however long it sits.
    #[test]
    fn prop_sentinel_never_expires(idle_days in 0i64..100_000) {
        let entry = CacheEntry::new(b"v".to_vec(), Vec::new(), None, None);
        let later = entry.last_access + TimeDelta::days(idle_days);
        prop_assert!(!entry.is_expired_at(later));
    }

    // Sliding expiry is decided by idle time alone.
    #[test]
    fn prop_sliding_window_boundary(window_ms in 1i64..1_000_000, idle_ms in 0i64..2_000_000) {
        let mut entry = CacheEntry::new(
            Vec::new(),
            Vec::new(),
            Some(TimeDelta::milliseconds(window_ms)),
            None,
        );
        entry.last_access = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let now = entry.last_access + TimeDelta::milliseconds(idle_ms);
        prop_assert_eq!(entry.is_expired_at(now), idle_ms > window_ms);
    }

    // After any sequence of operations, reads match a model of the cache and
    // every index holds exactly the entries that depend on its entity set.
    #[test]
    fn prop_index_matches_entries(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let cache = new_cache();
        let mut model: HashMap<String, (Vec<u8>, Vec<String>)> = HashMap::new();

        tokio_test::block_on(async {
            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    CacheOp::Put { key, entity_sets } => {
                        let value = format!("{key}@{step}").into_bytes();
                        cache.put(&key, value.clone(), entity_sets.as_slice(), None, None).await.unwrap();
                        model.insert(key, (value, entity_sets));
                    }
                    CacheOp::Get { key } => {
                        let expected = model.get(&key).map(|(value, _)| value.clone());
                        prop_assert_eq!(cache.get(&key).await.unwrap(), expected);
                    }
                    CacheOp::InvalidateItem { key } => {
                        cache.invalidate_item(&key).await.unwrap();
                        model.remove(&key);
                    }
                    CacheOp::InvalidateSets { entity_sets } => {
                        let mut removed = cache.invalidate_sets(entity_sets.as_slice()).await.unwrap();
                        let mut expected: Vec<String> = model
                            .iter()
                            .filter(|(_, (_, sets))| sets.iter().any(|s| entity_sets.contains(s)))
                            .map(|(key, _)| key.clone())
                            .collect();
                        removed.sort();
                        expected.sort();
                        prop_assert_eq!(removed, expected);
                        model.retain(|_, (_, sets)| !sets.iter().any(|s| entity_sets.contains(s)));
                    }
                }
            }

            for name in ENTITY_SETS {
                let members = cache.index().members(name).await.unwrap();
                let expected: HashSet<String> = model
                    .iter()
                    .filter(|(_, (_, sets))| sets.iter().any(|s| s == name))
                    .map(|(key, _)| key.clone())
                    .collect();
                prop_assert_eq!(members, expected, "index {} out of sync", name);
            }
            Ok(())
        })?;
    }
}
