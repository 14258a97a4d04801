//! Quorum lease locks over independent store instances.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{normalize_resources, LockConfig, LockHandle, LockProvider};
use crate::backend::Backend;
use crate::cache::Keyspace;
use crate::error::{CacheError, Result};

// == Redlock ==
/// A lock is held when a majority of instances granted the lease and enough
/// of the lease remains after subtracting acquisition time and clock drift.
pub struct Redlock {
    instances: Vec<Arc<dyn Backend>>,
    keyspace: Keyspace,
    config: LockConfig,
}

impl Redlock {
    pub fn new(
        instances: Vec<Arc<dyn Backend>>,
        keyspace: Keyspace,
        config: LockConfig,
    ) -> Result<Self> {
        if instances.is_empty() {
            return Err(CacheError::Config(
                "Redlock needs at least one instance".to_string(),
            ));
        }
        Ok(Self {
            instances,
            keyspace,
            config,
        })
    }

    pub fn quorum(&self) -> usize {
        self.instances.len() / 2 + 1
    }

    async fn lock_instances(&self, keys: &[String], token: &str) -> usize {
        let mut granted = 0;
        for (position, instance) in self.instances.iter().enumerate() {
            match instance.lock_acquire(keys, token, self.config.lease).await {
                Ok(true) => granted += 1,
                Ok(false) => {}
                Err(err) => debug!(instance = position, error = %err, "Lock instance failed"),
            }
        }
        granted
    }

    async fn unlock_instances(&self, keys: &[String], token: &str) -> usize {
        let mut failed = 0;
        for (position, instance) in self.instances.iter().enumerate() {
            if let Err(err) = instance.lock_release(keys, token).await {
                debug!(instance = position, error = %err, "Lock release failed");
                failed += 1;
            }
        }
        failed
    }

    fn drift(&self) -> Duration {
        self.config.lease.mul_f64(self.config.drift_factor) + Duration::from_millis(2)
    }

    fn next_pause(&self) -> Duration {
        let jitter_ms = u64::try_from(self.config.retry_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.config.retry_delay + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl LockProvider for Redlock {
    async fn acquire(&self, resources: &[String]) -> Result<LockHandle> {
        let resources = normalize_resources(resources)?;
        let keys: Vec<String> = resources.iter().map(|r| self.keyspace.lock(r)).collect();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let token = Uuid::new_v4().to_string();
            let attempt_started = Instant::now();
            let granted = self.lock_instances(&keys, &token).await;
            let spent = attempt_started.elapsed() + self.drift();

            if granted >= self.quorum() && self.config.lease > spent {
                let validity = self.config.lease - spent;
                debug!(?resources, attempts, ?validity, "Lock acquired");
                return Ok(LockHandle::new(resources, keys, token, validity));
            }

            // Partial grants must not linger until their lease runs out
            self.unlock_instances(&keys, &token).await;

            let waited = started.elapsed();
            if waited >= self.config.wait {
                warn!(?resources, attempts, ?waited, "Lock wait budget exhausted");
                return Err(CacheError::LockUnavailable { resources, waited });
            }
            let pause = self.next_pause().min(self.config.wait - waited);
            tokio::time::sleep(pause).await;
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<()> {
        let failed = self.unlock_instances(handle.keys(), handle.token()).await;
        if failed == self.instances.len() {
            return Err(CacheError::Unavailable(format!(
                "could not reach any lock instance to release {:?}",
                handle.resources()
            )));
        }
        Ok(())
    }
}
