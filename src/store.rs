use async_trait::async_trait;
use std::time::Duration;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;

/// A store is a common interface for storing, reading and deleting key-value pairs,
/// plus the two atomic lease primitives distributed locking is built on.
///
/// Stores are type-agnostic and work with `StoredEntry` which can hold either
/// typed values (for in-memory stores), serialized JSON (for persistent stores)
/// or the negative-cache marker.
///
/// Implementations must report connectivity failures as `CacheError::Unavailable`,
/// never as a miss, and must not block indefinitely.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Returns the storage mode preference for this store.
    ///
    /// - `StorageMode::Typed`: In-memory stores prefer typed values (zero-copy)
    /// - `StorageMode::Serialized`: Persistent stores prefer serialized JSON
    ///
    /// Default implementation returns `Serialized` for safety.
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Serialized
    }

    /// Return the cached entry.
    ///
    /// The response must be `None` for cache misses and for expired entries.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    /// Sets the entry for the given key.
    ///
    /// The entry must not be returned by `get` after `entry.expires_at()` (unix milli timestamp).
    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError>;

    /// Removes the key(s) from the store. Removing a missing key is not an error.
    async fn remove(&self, namespace: &str, keys: &[&str]) -> Result<(), CacheError>;

    /// Create a lease on `lock_key` holding `token` for `ttl`, only if no live
    /// lease exists.
    ///
    /// Must be one indivisible operation: check-then-write races are not allowed.
    /// Returns `Ok(true)` when the lease was created.
    async fn try_acquire(
        &self,
        lock_key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Delete the lease on `lock_key` only if it still holds `token`.
    ///
    /// Must be one indivisible compare-and-delete. Returns `Ok(false)` when the
    /// lease is gone or belongs to another holder.
    async fn release(&self, lock_key: &str, token: &str) -> Result<bool, CacheError>;

    /// The token of the live lease on `lock_key`, if any.
    async fn lease_holder(&self, lock_key: &str) -> Result<Option<String>, CacheError>;
}
