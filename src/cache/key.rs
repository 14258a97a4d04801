//! Key Module
//!
//! Maps logical keys to bounded storage keys and lays out the namespace.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Logical keys at least this long are replaced by their digest.
pub const MAX_PLAIN_KEY_LENGTH: usize = 128;

// == Hash Key ==
/// Normalizes a logical key to a storage key.
///
/// Keys shorter than [`MAX_PLAIN_KEY_LENGTH`] bytes pass through unchanged,
/// longer ones become the base64 SHA-256 digest (44 bytes). Because every
/// output is itself below the threshold, hashing a storage key returns it
/// unchanged.
pub fn hash_key(logical_key: &str) -> Result<String> {
    if logical_key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "Key cannot be empty".to_string(),
        ));
    }

    if logical_key.len() < MAX_PLAIN_KEY_LENGTH {
        return Ok(logical_key.to_string());
    }

    let digest = Sha256::digest(logical_key.as_bytes());
    Ok(STANDARD.encode(digest))
}

// == Keyspace ==
/// Naming scheme for every key this cache writes under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prefix shared by every key in the namespace.
    pub fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    pub fn entry_prefix(&self) -> String {
        format!("{}:entry:", self.namespace)
    }

    pub fn entry(&self, storage_key: &str) -> String {
        format!("{}{}", self.entry_prefix(), storage_key)
    }

    pub fn index_prefix(&self) -> String {
        format!("{}:set:", self.namespace)
    }

    pub fn index(&self, entity_set: &str) -> String {
        format!("{}{}", self.index_prefix(), entity_set)
    }

    pub fn lock(&self, resource: &str) -> String {
        format!("{}:lock:{}", self.namespace, resource)
    }

    pub fn key_stats(&self, storage_key: &str) -> String {
        format!("{}:stats:key:{}", self.namespace, storage_key)
    }

    /// Set of storage keys that have statistics recorded.
    pub fn stats_registry(&self) -> String {
        format!("{}:stats:keys", self.namespace)
    }

    pub fn entity_set_stats(&self) -> String {
        format!("{}:stats:sets", self.namespace)
    }
}
