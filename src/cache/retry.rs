//! Retry Module
//!
//! Backoff for invalidation calls. An invalidation that never completes
//! leaves a stale result readable, so every attempt's failure is kept and
//! returned together when the schedule runs out.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{CacheError, Result};

// == Retry Policy ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// One retry per delay, after the first attempt.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Runs `attempt` until it succeeds, fails with a non-transient error,
    /// or the schedule is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = Vec::new();
        let mut delays = self.delays.iter();

        loop {
            match attempt().await {
                Ok(value) => {
                    if !failures.is_empty() {
                        info!(operation, retries = failures.len(), "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(
                        operation,
                        attempt = failures.len() + 1,
                        error = %err,
                        "Attempt failed"
                    );
                    failures.push(err);

                    match delays.next() {
                        Some(delay) => tokio::time::sleep(*delay).await,
                        None => {
                            return Err(CacheError::RetriesExhausted {
                                operation,
                                failures,
                            })
                        }
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_millis(1000),
        ])
    }
}
