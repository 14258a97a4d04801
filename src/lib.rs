//! Query Cache - Redis-backed query result cache
//!
//! Caches query results under their query text, tags each with the entity
//! sets it was read from, and invalidates by entity set when data changes.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::QueryCache;
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::spawn_repair_task;
