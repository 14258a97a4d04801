//! Lock Module
//!
//! Cross-process mutual exclusion scoped to entity sets (or any other named
//! resource). [`Redlock`] acquires a lease on a quorum of independent store
//! instances; [`LocalLocks`] gives the same semantics inside one process.

mod local;
mod redlock;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

pub use local::LocalLocks;
pub use redlock::Redlock;

// == Lock Config ==
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease after which a lock is reclaimed even if never released
    pub lease: Duration,
    /// Total time `acquire` may spend before failing
    pub wait: Duration,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Upper bound of the random extra pause added to `retry_delay`
    pub retry_jitter: Duration,
    /// Clock drift allowance as a fraction of the lease
    pub drift_factor: f64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(10),
            wait: Duration::from_secs(5),
            retry_delay: Duration::from_millis(200),
            retry_jitter: Duration::from_millis(50),
            drift_factor: 0.01,
        }
    }
}

// == Lock Handle ==
/// Proof of a held lock. Pass it back to [`LockProvider::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    resources: Vec<String>,
    keys: Vec<String>,
    token: String,
    validity: Duration,
}

impl LockHandle {
    pub(crate) fn new(
        resources: Vec<String>,
        keys: Vec<String>,
        token: String,
        validity: Duration,
    ) -> Self {
        Self {
            resources,
            keys,
            token,
            validity,
        }
    }

    /// Locked resource names, sorted.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Time the lock was guaranteed to stay held when it was granted.
    pub fn validity(&self) -> Duration {
        self.validity
    }
}

// == Lock Provider ==
#[async_trait]
pub trait LockProvider: Send + Sync + 'static {
    /// Locks every resource together, waiting up to the configured budget.
    /// Fails with [`CacheError::LockUnavailable`] when the budget runs out.
    async fn acquire(&self, resources: &[String]) -> Result<LockHandle>;

    /// Releases a lock. Releasing twice, or after the lease ran out, is a no-op.
    async fn release(&self, handle: &LockHandle) -> Result<()>;
}

/// Sorts and dedups resource names, rejecting empty input.
pub(crate) fn normalize_resources(resources: &[String]) -> Result<Vec<String>> {
    if resources.is_empty() {
        return Err(CacheError::InvalidArgument(
            "At least one lock resource is required".to_string(),
        ));
    }
    if resources.iter().any(String::is_empty) {
        return Err(CacheError::InvalidArgument(
            "Lock resource names cannot be empty".to_string(),
        ));
    }

    let mut normalized = resources.to_vec();
    normalized.sort();
    normalized.dedup();
    Ok(normalized)
}
