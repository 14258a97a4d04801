//! Cache Module
//!
//! Query result caching with entity-set based invalidation over a shared
//! backing store.

mod entry;
mod failure;
mod index;
mod key;
mod retry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_time, decode, encode, CacheEntry};
pub use failure::{CacheFailure, FailureChannel, Operation};
pub use index::EntitySetIndex;
pub use key::{hash_key, Keyspace, MAX_PLAIN_KEY_LENGTH};
pub use retry::RetryPolicy;
pub use stats::{EntitySetStatistics, KeyStatistics, StatisticsTracker};
pub use store::QueryCache;
