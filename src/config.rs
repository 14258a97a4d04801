//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::lock::LockConfig;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis URL holding entries, indexes and statistics
    pub redis_url: String,
    /// Redis URLs used as independent lock instances
    pub lock_redis_urls: Vec<String>,
    /// Prefix of every key written by this deployment
    pub namespace: String,
    /// Record per-key hit/miss/invalidation counters
    pub collect_statistics: bool,
    /// Backoff between invalidation attempts, in milliseconds
    pub retry_delays_ms: Vec<u64>,
    /// Upper bound on a single store call, in milliseconds
    pub operation_timeout_ms: u64,
    /// Lock lease, in milliseconds
    pub lock_lease_ms: u64,
    /// Lock wait budget, in milliseconds
    pub lock_wait_ms: u64,
    /// Pause between lock attempts, in milliseconds
    pub lock_retry_ms: u64,
    /// Index repair interval in seconds, 0 disables the task
    pub repair_interval: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Cache store (default: redis://127.0.0.1:6379)
    /// - `LOCK_REDIS_URLS` - Comma separated lock instances (default: `REDIS_URL`)
    /// - `CACHE_NAMESPACE` - Key prefix (default: qc)
    /// - `COLLECT_STATISTICS` - true/false (default: false)
    /// - `RETRY_DELAYS_MS` - Comma separated backoff (default: 100,500,1000)
    /// - `OPERATION_TIMEOUT_MS` - Per call timeout (default: 2000)
    /// - `LOCK_LEASE_MS` / `LOCK_WAIT_MS` / `LOCK_RETRY_MS` (default: 10000/5000/200)
    /// - `REPAIR_INTERVAL` - Index repair frequency in seconds (default: 60)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let redis_url = env::var("REDIS_URL").unwrap_or(defaults.redis_url);
        let lock_redis_urls = env::var("LOCK_REDIS_URLS")
            .ok()
            .map(|v| split_list(&v))
            .filter(|urls| !urls.is_empty())
            .unwrap_or_else(|| vec![redis_url.clone()]);

        Self {
            redis_url,
            lock_redis_urls,
            namespace: env::var("CACHE_NAMESPACE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.namespace),
            collect_statistics: parse_var("COLLECT_STATISTICS", defaults.collect_statistics),
            retry_delays_ms: env::var("RETRY_DELAYS_MS")
                .ok()
                .and_then(|v| split_list(&v).iter().map(|d| d.parse().ok()).collect())
                .unwrap_or(defaults.retry_delays_ms),
            operation_timeout_ms: parse_var("OPERATION_TIMEOUT_MS", defaults.operation_timeout_ms),
            lock_lease_ms: parse_var("LOCK_LEASE_MS", defaults.lock_lease_ms),
            lock_wait_ms: parse_var("LOCK_WAIT_MS", defaults.lock_wait_ms),
            lock_retry_ms: parse_var("LOCK_RETRY_MS", defaults.lock_retry_ms),
            repair_interval: parse_var("REPAIR_INTERVAL", defaults.repair_interval),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Settings of the cache facade.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            namespace: self.namespace.clone(),
            collect_statistics: self.collect_statistics,
            retry_delays: self
                .retry_delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            ..CacheConfig::default()
        }
    }

    /// Settings of the distributed lock manager.
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            lease: Duration::from_millis(self.lock_lease_ms),
            wait: Duration::from_millis(self.lock_wait_ms),
            retry_delay: Duration::from_millis(self.lock_retry_ms),
            ..LockConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            lock_redis_urls: vec!["redis://127.0.0.1:6379".to_string()],
            namespace: "qc".to_string(),
            collect_statistics: false,
            retry_delays_ms: vec![100, 500, 1000],
            operation_timeout_ms: 2000,
            lock_lease_ms: 10_000,
            lock_wait_ms: 5_000,
            lock_retry_ms: 200,
            repair_interval: 60,
            server_port: 3000,
        }
    }
}

// == Cache Config ==
/// Settings of [`crate::cache::QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix of every key written by the cache
    pub namespace: String,
    /// Record statistics on reads and invalidations
    pub collect_statistics: bool,
    /// Pause before each retry of a failed invalidation
    pub retry_delays: Vec<Duration>,
    /// Buffered failures per subscriber before the slowest starts lagging
    pub failure_channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "qc".to_string(),
            collect_statistics: false,
            retry_delays: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ],
            failure_channel_capacity: 256,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
