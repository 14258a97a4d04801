//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for set-wide invalidation (POST /invalidate/sets)
///
/// # Fields
/// - `entity_sets`: Names of the entity sets whose dependents are invalidated
/// - `lock`: Hold the distributed lock on the sets while sweeping
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateSetsRequest {
    pub entity_sets: Vec<String>,
    #[serde(default)]
    pub lock: bool,
}

impl InvalidateSetsRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.entity_sets.is_empty() {
            return Some("At least one entity set is required".to_string());
        }
        if self.entity_sets.iter().any(String::is_empty) {
            return Some("Entity set names cannot be empty".to_string());
        }
        None
    }
}

/// Request body for single-entry invalidation (POST /invalidate/item)
///
/// `key` is either the logical key or the storage key derived from it.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateItemRequest {
    pub key: String,
}

impl InvalidateItemRequest {
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        None
    }
}
