//! Cache protocol scenarios shared by the in-memory and Redis suites.

#![allow(dead_code)]

use std::time::Duration;

use chrono::TimeDelta;
use query_cache::cache::current_time;
use query_cache::QueryCache;

pub const NO_SETS: &[&str] = &[];

pub async fn round_trip(cache: &QueryCache) {
    cache
        .put("SELECT * FROM orders", b"rows".to_vec(), &["Orders"], None, None)
        .await
        .unwrap();

    assert_eq!(
        cache.get("SELECT * FROM orders").await.unwrap(),
        Some(b"rows".to_vec())
    );
}

pub async fn past_absolute_expiration_is_a_miss(cache: &QueryCache) {
    cache
        .put(
            "expired",
            b"v".to_vec(),
            NO_SETS,
            None,
            Some(current_time() - TimeDelta::seconds(1)),
        )
        .await
        .unwrap();

    assert_eq!(cache.get("expired").await.unwrap(), None);
}

pub async fn negative_sliding_expiration_is_a_miss(cache: &QueryCache) {
    cache
        .put(
            "negative",
            b"v".to_vec(),
            NO_SETS,
            Some(TimeDelta::milliseconds(-1)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(cache.get("negative").await.unwrap(), None);
}

/// A one second window stays alive while read every 400ms, and lapses once
/// reads stop.
pub async fn sliding_expiration_kept_alive_by_reads(cache: &QueryCache) {
    cache
        .put(
            "sliding",
            b"v".to_vec(),
            NO_SETS,
            Some(TimeDelta::seconds(1)),
            None,
        )
        .await
        .unwrap();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(cache.get("sliding").await.unwrap(), Some(b"v".to_vec()));
    }

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(cache.get("sliding").await.unwrap(), None);
}

/// Entries 1..=4 depend on {ES1,ES2}, {ES2,ES3}, {ES1,ES3,ES4}, {ES3,ES4}.
/// Invalidating [ES1, ES2] removes 1, 2 and 3 and keeps 4.
pub async fn overlapping_entity_set_invalidation(cache: &QueryCache) {
    let entries: [(&str, &[&str]); 4] = [
        ("1", &["ES1", "ES2"]),
        ("2", &["ES2", "ES3"]),
        ("3", &["ES1", "ES3", "ES4"]),
        ("4", &["ES3", "ES4"]),
    ];
    for (key, entity_sets) in entries {
        cache
            .put(key, key.as_bytes().to_vec(), entity_sets, None, None)
            .await
            .unwrap();
    }

    let mut removed = cache.invalidate_sets(&["ES1", "ES2"]).await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["1", "2", "3"]);

    for key in ["1", "2", "3"] {
        assert_eq!(cache.get(key).await.unwrap(), None, "entry {key}");
    }
    assert_eq!(cache.get("4").await.unwrap(), Some(b"4".to_vec()));

    // survivors no longer point at removed entries
    let es3 = cache.index().members("ES3").await.unwrap();
    assert_eq!(es3.into_iter().collect::<Vec<_>>(), vec!["4".to_string()]);
}

pub async fn item_invalidation_is_idempotent(cache: &QueryCache) {
    cache
        .put("item", b"v".to_vec(), &["ES1"], None, None)
        .await
        .unwrap();

    cache.invalidate_item("item").await.unwrap();
    cache.invalidate_item("item").await.unwrap();
    cache.invalidate_item("never_stored").await.unwrap();

    assert_eq!(cache.get("item").await.unwrap(), None);
    assert!(cache.index().members("ES1").await.unwrap().is_empty());
}

pub async fn purge_empties_the_namespace(cache: &QueryCache) {
    cache.put("a", b"1".to_vec(), &["ES1"], None, None).await.unwrap();
    cache.put("b", b"2".to_vec(), &["ES1", "ES2"], None, None).await.unwrap();
    assert!(cache.count().await.unwrap() >= 4);

    cache.purge().await.unwrap();

    assert_eq!(cache.count().await.unwrap(), 0);
    assert_eq!(cache.get("a").await.unwrap(), None);
    assert_eq!(cache.get("b").await.unwrap(), None);
}
