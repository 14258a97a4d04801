//! Cache Entry Module
//!
//! Defines the entry envelope stored at a storage key, its expiration rules
//! and its byte encoding.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// == Cache Entry ==
/// A cached query result plus the metadata needed to expire and invalidate it.
///
/// The JSON field `entity_sets` is read by the server-side scripts, so its
/// name and array shape are part of the storage format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque serialized payload
    #[serde(with = "payload")]
    pub value: Vec<u8>,
    /// Entity sets this result depends on
    pub entity_sets: Vec<String>,
    /// Idle window, None = no sliding expiration
    #[serde(with = "sliding_millis")]
    pub sliding_expiration: Option<TimeDelta>,
    /// Hard deadline, None = no absolute expiration
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Last successful read (or creation)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_access: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry last accessed now.
    pub fn new(
        value: Vec<u8>,
        entity_sets: Vec<String>,
        sliding_expiration: Option<TimeDelta>,
        absolute_expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value,
            entity_sets,
            sliding_expiration,
            absolute_expiration,
            last_access: current_time(),
        }
    }

    /// True when neither expiration applies; such entries leave the cache
    /// only through invalidation.
    pub fn never_expires(&self) -> bool {
        self.sliding_expiration.is_none() && self.absolute_expiration.is_none()
    }

    // == Is Expired ==
    /// Checks staleness at `now`.
    ///
    /// Absolute: expired once `now >= absolute_expiration`, so a tick exactly
    /// at the deadline counts. Sliding: expired when the idle time strictly
    /// exceeds the window. Negative windows are always expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.never_expires() {
            return false;
        }

        if let Some(deadline) = self.absolute_expiration {
            if now >= deadline {
                return true;
            }
        }

        match self.sliding_expiration {
            Some(window) => now - self.last_access > window,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_time())
    }

    /// Marks the entry as read at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now;
    }

    // == Store TTL ==
    /// Expiry to put on the stored key so expiring entries are reclaimed even
    /// if nobody reads them again: the earlier of the absolute deadline and
    /// one millisecond past the sliding window, measured from `now`. Lapsed
    /// deadlines and negative windows map to one millisecond.
    pub fn store_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until_deadline = self.absolute_expiration.map(|deadline| deadline - now);
        let until_idle = self
            .sliding_expiration
            .map(|window| window.checked_add(&TimeDelta::milliseconds(1)).unwrap_or(window));

        let remaining = match (until_deadline, until_idle) {
            (Some(deadline), Some(idle)) => deadline.min(idle),
            (Some(deadline), None) => deadline,
            (None, Some(idle)) => idle,
            (None, None) => return None,
        };

        Some(
            remaining
                .to_std()
                .ok()
                .filter(|remaining| !remaining.is_zero())
                .unwrap_or(Duration::from_millis(1)),
        )
    }
}

// == Codec ==
/// Encodes an entry. An absent entry encodes to empty bytes.
pub fn encode(entry: Option<&CacheEntry>) -> Result<Vec<u8>> {
    match entry {
        Some(entry) => Ok(serde_json::to_vec(entry)?),
        None => Ok(Vec::new()),
    }
}

/// Decodes stored bytes. Empty bytes decode to `None`, not an error.
pub fn decode(bytes: &[u8]) -> Result<Option<CacheEntry>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(bytes)?))
}

// == Utility Functions ==
/// Current time at the millisecond precision entries are stored with.
pub fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

mod payload {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod sliding_millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<TimeDelta>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|window| window.num_milliseconds())
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TimeDelta>, D::Error> {
        match Option::<i64>::deserialize(deserializer)? {
            Some(ms) => TimeDelta::try_milliseconds(ms)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("sliding expiration out of range")),
            None => Ok(None),
        }
    }
}
