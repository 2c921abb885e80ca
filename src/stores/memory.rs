use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;

use crate::utils::{build_cache_key, expires_in, now_ms};

/// Default number of writes between sweeps of expired entries and leases.
const DEFAULT_PURGE_INTERVAL: u64 = 1024;

/// A live lease on a lock key.
#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: i64,
}

/// Thread-safe in-memory cache store using HashMap with RwLock.
///
/// This is a simple store suitable for:
/// - Tests and single-process deployments
/// - Low to moderate concurrency (<8 threads)
/// - Small to medium cache sizes (<1000 items)
///
/// Expired entries are dropped when read, and every `purge_interval` writes
/// (sets and lease acquisitions) a sweep drops the ones nobody reads again.
///
/// Leases only exclude callers sharing this instance. For high-concurrency
/// scenarios, consider using `MokaStore`; for multiple processes, `RedisStore`.
pub struct HashMapStore {
    state: RwLock<HashMap<String, StoredEntry>>,
    leases: RwLock<HashMap<String, Lease>>,
    writes: AtomicU64,
    purge_interval: u64,
}

impl Default for HashMapStore {
    fn default() -> Self {
        HashMapStore {
            state: RwLock::default(),
            leases: RwLock::default(),
            writes: AtomicU64::new(0),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }
}

impl HashMapStore {
    /// Create a new, empty HashMapStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep expired entries and leases every `writes` writes instead of the
    /// default 1024. Zero disables the sweep.
    pub fn with_purge_interval(mut self, writes: u64) -> Self {
        self.purge_interval = writes;
        self
    }

    /// Count a write, returning whether it is due for a sweep.
    fn sweep_due(&self) -> bool {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        self.purge_interval > 0 && writes % self.purge_interval == 0
    }

    /// Drop all expired entries and leases.
    pub async fn purge_expired(&self) {
        let now = now_ms();
        self.state.write().await.retain(|_, e| !e.is_expired(now));
        self.leases.write().await.retain(|_, l| l.expires_at > now);
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    /// Whether no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }
}

#[async_trait]
impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn storage_mode(&self) -> StorageMode {
        StorageMode::Typed
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let cache_key = build_cache_key(namespace, key);
        let state = self.state.read().await;

        let Some(stored) = state.get(&cache_key) else {
            return Ok(None);
        };

        if stored.is_expired(now_ms()) {
            // Entry is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            if state.get(&cache_key).is_some_and(|e| e.is_expired(now_ms())) {
                state.remove(&cache_key);
            }
            return Ok(None);
        }

        Ok(Some(stored.clone()))
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let cache_key = build_cache_key(namespace, key);
        let mut state = self.state.write().await;
        state.insert(cache_key, entry);

        if self.sweep_due() {
            let now = now_ms();
            state.retain(|_, e| !e.is_expired(now));
            drop(state);
            self.leases.write().await.retain(|_, l| l.expires_at > now);
        }
        Ok(())
    }

    async fn remove(&self, namespace: &str, keys: &[&str]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        for key in keys {
            let cache_key = build_cache_key(namespace, key);
            state.remove(&cache_key);
        }

        Ok(())
    }

    async fn try_acquire(
        &self,
        lock_key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut leases = self.leases.write().await;

        if self.sweep_due() {
            let now = now_ms();
            leases.retain(|_, l| l.expires_at > now);
        }

        if leases
            .get(lock_key)
            .is_some_and(|lease| lease.expires_at > now_ms())
        {
            return Ok(false);
        }

        leases.insert(
            lock_key.to_string(),
            Lease {
                token: token.to_string(),
                expires_at: expires_in(ttl),
            },
        );
        Ok(true)
    }

    async fn release(&self, lock_key: &str, token: &str) -> Result<bool, CacheError> {
        let mut leases = self.leases.write().await;

        match leases.get(lock_key) {
            Some(lease) if lease.token == token && lease.expires_at > now_ms() => {
                leases.remove(lock_key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lease_holder(&self, lock_key: &str) -> Result<Option<String>, CacheError> {
        let leases = self.leases.read().await;
        Ok(leases
            .get(lock_key)
            .filter(|lease| lease.expires_at > now_ms())
            .map(|lease| lease.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Cached;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = HashMapStore::new();

        // Initially empty
        let result = store.get("users", "key1").await.unwrap();
        assert!(result.is_none());

        // Set a value
        let entry = StoredEntry::from_typed("value1".to_string(), now_ms() + 60_000);
        store.set("users", "key1", entry).await.unwrap();

        // Get the value
        let result = store.get("users", "key1").await.unwrap().unwrap();
        assert_eq!(
            result.into_typed::<String>().unwrap(),
            Cached::Value("value1".to_string())
        );

        // Remove the value, twice
        store.remove("users", &["key1"]).await.unwrap();
        store.remove("users", &["key1"]).await.unwrap();

        // Should be gone
        let result = store.get("users", "key1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = HashMapStore::new();
        store
            .set("users", "old", StoredEntry::absent(now_ms() - 1))
            .await
            .unwrap();

        assert!(store.get("users", "old").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released() {
        let store = HashMapStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.try_acquire("lock:a", "t1", ttl).await.unwrap());
        assert!(!store.try_acquire("lock:a", "t2", ttl).await.unwrap());
        assert!(store.try_acquire("lock:b", "t2", ttl).await.unwrap());

        // Wrong token does nothing
        assert!(!store.release("lock:a", "t2").await.unwrap());
        assert_eq!(
            store.lease_holder("lock:a").await.unwrap().as_deref(),
            Some("t1")
        );

        assert!(store.release("lock:a", "t1").await.unwrap());
        assert!(store.lease_holder("lock:a").await.unwrap().is_none());
        assert!(store.try_acquire("lock:a", "t2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let store = HashMapStore::new();

        assert!(
            store
                .try_acquire("lock:a", "t1", Duration::from_millis(20))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.lease_holder("lock:a").await.unwrap().is_none());
        assert!(
            store
                .try_acquire("lock:a", "t2", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = HashMapStore::new();
        let now = now_ms();
        store
            .set("users", "stale", StoredEntry::absent(now - 10))
            .await
            .unwrap();
        store
            .set("users", "live", StoredEntry::absent(now + 60_000))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        store.purge_expired().await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_unread_expired_entries() {
        let store = HashMapStore::new().with_purge_interval(4);
        let now = now_ms();

        for key in ["a", "b", "c"] {
            store
                .set("users", key, StoredEntry::absent(now - 1))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 3);

        // Fourth write triggers the sweep
        store
            .set("users", "live", StoredEntry::absent(now + 60_000))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_acquisitions_sweep_lapsed_leases() {
        let store = HashMapStore::new().with_purge_interval(4);
        let short = Duration::from_millis(10);

        for lock_key in ["lock:a", "lock:b", "lock:c"] {
            assert!(store.try_acquire(lock_key, "t1", short).await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(
            store
                .try_acquire("lock:d", "t1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert_eq!(store.leases.read().await.len(), 1);
    }
}
