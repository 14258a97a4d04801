//! Failure Notification Module
//!
//! Broadcasts cache failures to subscribers. With no live subscriber a
//! failure is returned to the caller instead, so nothing is dropped silently.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{CacheError, Result};

/// Cache operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Put,
    /// Write-back of the last access time after a hit
    Touch,
    InvalidateItem,
    InvalidateSets,
}

// == Cache Failure ==
#[derive(Debug, Clone)]
pub struct CacheFailure {
    pub operation: Operation,
    /// Logical key, or the entity-set names joined by commas
    pub key: Option<String>,
    pub error: CacheError,
}

impl CacheFailure {
    pub fn new(operation: Operation, key: impl Into<String>, error: CacheError) -> Self {
        Self {
            operation,
            key: Some(key.into()),
            error,
        }
    }
}

// == Failure Channel ==
/// Bounded broadcast of failures.
///
/// A receiver more than `capacity` reports behind loses the oldest ones and
/// gets `RecvError::Lagged(n)` from its next `recv`. Lost reports may include
/// failed invalidations, so a receiver seeing `Lagged` must treat the cache as
/// possibly stale (for example by purging the namespace).
#[derive(Debug, Clone)]
pub struct FailureChannel {
    sender: broadcast::Sender<CacheFailure>,
}

impl FailureChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheFailure> {
        self.sender.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Delivers the failure to subscribers, or returns its error when there
    /// are none.
    pub fn report(&self, failure: CacheFailure) -> Result<()> {
        warn!(
            operation = ?failure.operation,
            key = failure.key.as_deref().unwrap_or_default(),
            error = %failure.error,
            "Cache operation failed"
        );

        let error = failure.error.clone();
        match self.sender.send(failure) {
            Ok(_) => Ok(()),
            Err(_) => Err(error),
        }
    }

    /// Delivers the failure to subscribers if any, never returning it.
    /// For failures that must not fail the surrounding operation.
    pub fn notify(&self, failure: CacheFailure) {
        warn!(
            operation = ?failure.operation,
            key = failure.key.as_deref().unwrap_or_default(),
            error = %failure.error,
            "Cache operation degraded"
        );
        let _ = self.sender.send(failure);
    }
}
