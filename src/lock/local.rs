//! In-process lease locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{normalize_resources, LockConfig, LockHandle, LockProvider};
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Instant,
}

// == Local Locks ==
/// Lock provider for a single process, with the lease, wait and retry
/// behavior of [`super::Redlock`].
#[derive(Debug, Clone)]
pub struct LocalLocks {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
    config: LockConfig,
}

impl LocalLocks {
    pub fn new(config: LockConfig) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    async fn try_lock(&self, resources: &[String], token: &str) -> bool {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        leases.retain(|_, lease| lease.expires_at > now);

        if resources.iter().any(|r| leases.contains_key(r)) {
            return false;
        }

        let expires_at = now + self.config.lease;
        for resource in resources {
            leases.insert(
                resource.clone(),
                Lease {
                    token: token.to_string(),
                    expires_at,
                },
            );
        }
        true
    }
}

impl Default for LocalLocks {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

#[async_trait]
impl LockProvider for LocalLocks {
    async fn acquire(&self, resources: &[String]) -> Result<LockHandle> {
        let resources = normalize_resources(resources)?;
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            if self.try_lock(&resources, &token).await {
                let keys = resources.clone();
                let validity = self.config.lease.saturating_sub(started.elapsed());
                return Ok(LockHandle::new(resources, keys, token, validity));
            }

            let waited = started.elapsed();
            if waited >= self.config.wait {
                return Err(CacheError::LockUnavailable { resources, waited });
            }
            let pause: Duration = self.config.retry_delay.min(self.config.wait - waited);
            tokio::time::sleep(pause).await;
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<()> {
        let mut leases = self.leases.lock().await;
        for key in handle.keys() {
            if leases.get(key).is_some_and(|lease| lease.token == handle.token()) {
                leases.remove(key);
            }
        }
        Ok(())
    }
}
