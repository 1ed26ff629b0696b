//! Pluggable backend trait for shared governance state.
//!
//! Allows swapping between in-memory (single process) and external
//! backends like Redis (multiple worker processes).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// Result type for shared store operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Errors from shared store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),
}

/// Key/counter store shared by every worker process.
///
/// Implementations must be thread-safe, and every mutation must be atomic
/// with respect to callers in other processes. Missing keys read as
/// `false`, `0` or `None`.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Whether a scalar key is present.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn get_bool(&self, key: &str) -> StoreResult<bool>;

    /// Set a boolean, optionally expiring after `ttl`.
    async fn set_bool(&self, key: &str, value: bool, ttl: Option<Duration>) -> StoreResult<()>;

    /// Atomically replace the string at `key` if it currently equals
    /// `expected` (`None` = absent). A `new` of `None` deletes the key.
    /// Returns true if the swap happened.
    async fn compare_and_set_str(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> StoreResult<bool>;

    async fn get_int(&self, key: &str) -> StoreResult<i64>;

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()>;

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Increment a counter inside namespace `ns`, returning the new value.
    async fn incr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64>;

    /// Decrement a counter inside namespace `ns`, returning the new value.
    /// Flooring is the caller's responsibility.
    async fn decr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64>;

    async fn get_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64>;

    async fn set_hash_int(&self, ns: &str, key: &str, value: i64) -> StoreResult<()>;

    async fn get_all_hash_int(&self, ns: &str) -> StoreResult<HashMap<String, i64>>;

    async fn del_hash_field(&self, ns: &str, key: &str) -> StoreResult<()>;

    /// Atomically clamp a counter to `cap`, subtract one, and delete the
    /// field once the result is zero or less. Returns the value left behind.
    async fn decay_hash_int(&self, ns: &str, key: &str, cap: i64) -> StoreResult<i64>;

    /// Record `cost` units in the moving window `key` if the units already
    /// recorded in the last `window` plus `cost` stay within `limit`.
    /// Returns false (recording nothing) otherwise.
    async fn window_hit(
        &self,
        key: &str,
        window: Duration,
        limit: u64,
        cost: u64,
        now_ms: i64,
    ) -> StoreResult<bool>;

    /// Units recorded in the moving window `key` during the last `window`.
    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> StoreResult<u64>;
}
