use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::future::ready;
use std::time::{Duration, Instant};

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::{build_cache_key, expires_in, now_ms};

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of cache entries the store can hold.
    ///
    /// Leases are not counted: a live lease is never evicted.
    pub max_capacity: u64,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    ttl: Duration,
    expires_at: i64,
}

impl Lease {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Drops each lease once its own TTL has passed.
struct LeaseExpiry;

impl Expiry<String, Lease> for LeaseExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        lease: &Lease,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(lease.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        lease: &Lease,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(lease.ttl)
    }
}

/// High-performance concurrent cache store using Moka.
///
/// MokaStore provides:
/// - Lock-free concurrent access for reads and writes
/// - Automatic background eviction of entries by capacity; leases are
///   unbounded and expire only by their own TTL
/// - Per-key atomic lease operations (`and_compute_with`), so acquisition and
///   compare-and-delete never race with each other
///
/// Like `HashMapStore`, leases only exclude callers sharing this instance.
pub struct MokaStore {
    cache: Cache<String, StoredEntry>,
    leases: Cache<String, Lease>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let store = MokaStore::new(MokaStoreConfig {
    ///     max_capacity: 100_000,
    /// });
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        MokaStore {
            cache: Cache::builder().max_capacity(config.max_capacity).build(),
            leases: Cache::builder().expire_after(LeaseExpiry).build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    fn storage_mode(&self) -> StorageMode {
        StorageMode::Typed
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let cache_key = build_cache_key(namespace, key);

        match self.cache.get(&cache_key).await {
            Some(entry) if entry.is_expired(now_ms()) => {
                self.cache.invalidate(&cache_key).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let cache_key = build_cache_key(namespace, key);
        self.cache.insert(cache_key, entry).await;
        Ok(())
    }

    async fn remove(&self, namespace: &str, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            let cache_key = build_cache_key(namespace, key);
            self.cache.invalidate(&cache_key).await;
        }

        Ok(())
    }

    async fn try_acquire(
        &self,
        lock_key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let lease = Lease {
            token: token.to_string(),
            ttl,
            expires_at: expires_in(ttl),
        };

        let result = self
            .leases
            .entry_by_ref(lock_key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(held) if held.value().is_live(now_ms()) => Op::Nop,
                    _ => Op::Put(lease),
                };
                ready(op)
            })
            .await;

        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    async fn release(&self, lock_key: &str, token: &str) -> Result<bool, CacheError> {
        let result = self
            .leases
            .entry_by_ref(lock_key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(held) if held.value().token == token && held.value().is_live(now_ms()) => {
                        Op::Remove
                    }
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;

        Ok(matches!(result, CompResult::Removed(_)))
    }

    async fn lease_holder(&self, lock_key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .leases
            .get(lock_key)
            .await
            .filter(|lease| lease.is_live(now_ms()))
            .map(|lease| lease.token))
    }
}
