use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LoaderConfig;
use crate::entry::{Cached, StoredEntry};
use crate::error::{BoxError, CacheError, LoadError};
use crate::lock::DistributedLock;
use crate::store::Store;
use crate::utils::{build_lock_key, expires_in, new_token, now_ms};

/// Where a `get_or_load` answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A live cache entry, value or negative.
    Cache,
    /// This call ran the loader and cached the result.
    Loader,
    /// The cache tier failed; the loader ran and its result was not cached.
    Degraded,
}

/// Answer of a `get_or_load` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<V> {
    /// The value, or `None` when the key has no backing data.
    pub value: Option<V>,
    pub source: Source,
}

impl<V> Loaded<V> {
    fn from_cache(cached: Cached<V>) -> Self {
        Loaded {
            value: cached.into_value(),
            source: Source::Cache,
        }
    }

    /// Whether the answer bypassed a failing cache tier.
    pub fn is_degraded(&self) -> bool {
        self.source == Source::Degraded
    }

    pub fn into_value(self) -> Option<V> {
        self.value
    }
}

/// Cache-aside loading with one loader run per key across every process
/// sharing the store.
///
/// On a miss the caller takes the key's population lock, re-reads, and only
/// then runs the loader. Callers that lose the race back off and start over
/// until the value shows up or their wait budget runs out. Absence results are
/// cached as negative entries for `penetration_ttl`. Any store fault abandons
/// the cache for that call and the loader result is returned uncached.
#[derive(Clone)]
pub struct CacheOrchestrator {
    store: Arc<dyn Store>,
    lock: DistributedLock,
    config: LoaderConfig,
}

impl CacheOrchestrator {
    /// Create an orchestrator over the given store.
    pub fn new(store: Arc<dyn Store>, config: LoaderConfig) -> Self {
        CacheOrchestrator {
            lock: DistributedLock::new(store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The lock manager guarding population, sharing this orchestrator's store.
    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// The lock key guarding population of `key`.
    pub fn lock_key(&self, namespace: &str, key: &str) -> String {
        build_lock_key(namespace, key)
    }

    /// Get the value for `key`, running `loader` on a miss.
    ///
    /// `loader` receives the key and returns `Ok(None)` when there is no
    /// backing data. A value is cached for `ttl`, absence for the configured
    /// `penetration_ttl`, and a loader error is never cached.
    ///
    /// # Errors
    /// * `LoadError::LockContentionTimeout` - another caller held the lock for the whole
    ///   wait budget
    /// * `LoadError::Loader` - the loader failed
    ///
    /// # Example
    /// ```ignore
    /// let activity = orchestrator
    ///     .get_or_load("activities", "activity:1001", Duration::from_secs(60), |key| async move {
    ///         db.find_activity(&key).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_or_load<V, F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Loaded<V>, LoadError>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        let started = Instant::now();
        let lock_key = build_lock_key(namespace, key);
        let token = new_token();
        let mut attempts: u32 = 0;

        loop {
            match self.read::<V>(namespace, key).await {
                Ok(Some(cached)) => return Ok(Loaded::from_cache(cached)),
                Ok(None) => {}
                Err(e) => return self.load_degraded(key, loader, &e).await,
            }

            match self
                .lock
                .try_acquire(&lock_key, &token, self.config.lock_lease_ttl)
                .await
            {
                Ok(true) => {
                    let guard = self.lock.guard(&lock_key, &token);
                    let outcome = self.load_locked(namespace, key, ttl, loader).await;
                    guard.release().await;
                    return outcome;
                }
                Ok(false) => {}
                Err(e) => return self.load_degraded(key, loader, &e).await,
            }

            attempts += 1;
            let waited = started.elapsed();
            if attempts >= self.config.max_retries
                || waited + self.config.retry_backoff > self.config.max_wait_budget
            {
                tracing::info!(
                    "Gave up waiting for lock: key={}, attempts={}, waited={:?}",
                    lock_key,
                    attempts,
                    waited
                );
                return Err(LoadError::LockContentionTimeout {
                    key: key.to_string(),
                    attempts,
                    waited,
                });
            }

            tracing::debug!(
                "Lock held elsewhere, backing off: key={}, attempt={}",
                lock_key,
                attempts
            );
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    /// Read the live entry for `key` without loading.
    pub async fn peek<V>(&self, namespace: &str, key: &str) -> Result<Option<Cached<V>>, CacheError>
    where
        V: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        match self.store.get(namespace, key).await? {
            Some(entry) if !entry.is_expired(now_ms()) => entry.into_typed().map(Some),
            _ => Ok(None),
        }
    }

    /// Store `value` for `key` directly, bypassing the lock.
    pub async fn put<V>(
        &self,
        namespace: &str,
        key: &str,
        value: V,
        ttl: Duration,
    ) -> Result<(), CacheError>
    where
        V: Serialize + Send + Sync + 'static,
    {
        let entry = StoredEntry::for_mode(self.store.storage_mode(), value, expires_in(ttl))?;
        self.store.set(namespace, key, entry).await
    }

    /// Drop the entry for `key`, value or negative.
    pub async fn invalidate(&self, namespace: &str, key: &str) -> Result<(), CacheError> {
        self.store.remove(namespace, &[key]).await
    }

    /// Lenient read used by the protocol: undecodable entries count as misses
    /// so the next load overwrites them.
    async fn read<V>(&self, namespace: &str, key: &str) -> Result<Option<Cached<V>>, CacheError>
    where
        V: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        match self.peek::<V>(namespace, key).await {
            Ok(Some(Cached::Absent)) => {
                tracing::debug!(
                    "Negative cache hit: namespace={}, key={}",
                    namespace,
                    key
                );
                Ok(Some(Cached::Absent))
            }
            Ok(hit) => Ok(hit),
            Err(CacheError::Serialization(message)) => {
                tracing::warn!(
                    "Ignoring undecodable cache entry: namespace={}, key={}, error={}",
                    namespace,
                    key,
                    message
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs while holding the population lock. The caller's guard releases it,
    /// also when the loader panics.
    async fn load_locked<V, F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Loaded<V>, LoadError>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        // The previous holder may have stored the value between our miss and our grant
        match self.read::<V>(namespace, key).await {
            Ok(Some(cached)) => {
                tracing::debug!(
                    "Populated while waiting for lock: namespace={}, key={}",
                    namespace,
                    key
                );
                return Ok(Loaded::from_cache(cached));
            }
            Ok(None) => {}
            Err(e) => return self.load_degraded(key, loader, &e).await,
        }

        let value = loader(key.to_string())
            .await
            .map_err(|e| LoadError::loader(key, e))?;

        let entry = match &value {
            Some(v) => {
                StoredEntry::for_mode(self.store.storage_mode(), v.clone(), expires_in(ttl))
            }
            None => Ok(StoredEntry::absent(expires_in(self.config.penetration_ttl))),
        };

        let stored = match entry {
            Ok(entry) => self.store.set(namespace, key, entry).await,
            Err(e) => Err(e),
        };

        let source = match stored {
            Ok(()) => Source::Loader,
            Err(e) => {
                tracing::warn!(
                    "Failed to cache loaded value: tier={}, namespace={}, key={}, error={}",
                    self.store.name(),
                    namespace,
                    key,
                    e
                );
                Source::Degraded
            }
        };

        Ok(Loaded { value, source })
    }

    async fn load_degraded<V, F, Fut, E>(
        &self,
        key: &str,
        loader: F,
        cause: &CacheError,
    ) -> Result<Loaded<V>, LoadError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        tracing::warn!(
            "Cache tier failed, loading without cache: tier={}, key={}, error={}",
            self.store.name(),
            key,
            cause
        );

        let value = loader(key.to_string())
            .await
            .map_err(|e| LoadError::loader(key, e))?;

        Ok(Loaded {
            value,
            source: Source::Degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::HashMapStore;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator() -> CacheOrchestrator {
        let config = LoaderConfig::default()
            .with_retry_backoff(Duration::from_millis(10))
            .with_max_wait_budget(Duration::from_millis(500));
        CacheOrchestrator::new(Arc::new(HashMapStore::new()), config)
    }

    #[tokio::test]
    async fn test_miss_loads_then_hits() {
        let orch = orchestrator();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected_source in [Source::Loader, Source::Cache] {
            let calls = calls.clone();
            let loaded = orch
                .get_or_load("activities", "a:1", Duration::from_secs(60), move |key| async move {
                    assert_eq!(key, "a:1");
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Some(30u32))
                })
                .await
                .unwrap();
            assert_eq!(loaded.value, Some(30));
            assert_eq!(loaded.source, expected_source);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absence_is_cached_as_sentinel() {
        let orch = orchestrator();

        let loaded = orch
            .get_or_load("activities", "a:404", Duration::from_secs(60), |_| async {
                Ok::<Option<u32>, Infallible>(None)
            })
            .await
            .unwrap();
        assert_eq!(loaded, Loaded { value: None, source: Source::Loader });

        let peeked = orch.peek::<u32>("activities", "a:404").await.unwrap();
        assert_eq!(peeked, Some(Cached::Absent));

        let loaded = orch
            .get_or_load("activities", "a:404", Duration::from_secs(60), |_| async {
                Ok::<_, Infallible>(Some(1u32))
            })
            .await
            .unwrap();
        assert_eq!(loaded, Loaded { value: None, source: Source::Cache });
    }

    #[tokio::test]
    async fn test_loader_fault_releases_lock_and_caches_nothing() {
        let orch = orchestrator();

        let err = orch
            .get_or_load("activities", "a:2", Duration::from_secs(60), |_| async {
                Err::<Option<u32>, _>(std::io::Error::other("db down"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Loader { .. }));
        assert_eq!(err.into_loader_error().unwrap().to_string(), "db down");
        assert!(orch.peek::<u32>("activities", "a:2").await.unwrap().is_none());
        let lock_key = orch.lock_key("activities", "a:2");
        assert!(orch.lock().holder(&lock_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_waiter_sees_value_stored_by_holder() {
        let orch = orchestrator();
        let lock_key = orch.lock_key("activities", "a:3");
        assert!(
            orch.lock()
                .acquire(&lock_key, "holder", Duration::from_secs(10))
                .await
        );

        let holder = orch.clone();
        let lock_key_clone = lock_key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            holder
                .put("activities", "a:3", 12u32, Duration::from_secs(60))
                .await
                .unwrap();
            holder.lock().release(&lock_key_clone, "holder").await;
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let loaded = orch
            .get_or_load("activities", "a:3", Duration::from_secs(60), move |_| async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Some(99u32))
            })
            .await
            .unwrap();

        assert_eq!(loaded, Loaded { value: Some(12), source: Source::Cache });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_count_bounds_the_wait() {
        let config = LoaderConfig::default()
            .with_retry_backoff(Duration::from_millis(1))
            .with_max_wait_budget(Duration::from_secs(60))
            .with_max_retries(3);
        let orch = CacheOrchestrator::new(Arc::new(HashMapStore::new()), config);
        let lock_key = orch.lock_key("activities", "a:4");
        assert!(orch.lock().acquire(&lock_key, "other", Duration::from_secs(60)).await);

        let err = orch
            .get_or_load("activities", "a:4", Duration::from_secs(60), |_| async {
                Ok::<_, Infallible>(Some(1u32))
            })
            .await
            .unwrap_err();

        match err {
            LoadError::LockContentionTimeout { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("Expected contention timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_overwritten() {
        let orch = orchestrator();
        orch.put("activities", "a:5", "not a number".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let loaded = orch
            .get_or_load("activities", "a:5", Duration::from_secs(60), |_| async {
                Ok::<_, Infallible>(Some(5u32))
            })
            .await
            .unwrap();
        assert_eq!(loaded, Loaded { value: Some(5), source: Source::Loader });
        assert_eq!(
            orch.peek::<u32>("activities", "a:5").await.unwrap(),
            Some(Cached::Value(5))
        );
    }

    #[tokio::test]
    async fn test_invalidate_drops_sentinel() {
        let orch = orchestrator();
        orch.get_or_load("activities", "a:6", Duration::from_secs(60), |_| async {
            Ok::<Option<u32>, Infallible>(None)
        })
        .await
        .unwrap();

        orch.invalidate("activities", "a:6").await.unwrap();

        let loaded = orch
            .get_or_load("activities", "a:6", Duration::from_secs(60), |_| async {
                Ok::<_, Infallible>(Some(6u32))
            })
            .await
            .unwrap();
        assert_eq!(loaded.value, Some(6));
    }

    #[tokio::test]
    async fn test_panicking_loader_releases_lock() {
        let orch = CacheOrchestrator::new(Arc::new(HashMapStore::new()), LoaderConfig::default());

        let panicking = orch.clone();
        let joined = tokio::spawn(async move {
            panicking
                .get_or_load("activities", "a:7", Duration::from_secs(60), |_| async {
                    if true {
                        panic!("loader bug");
                    }
                    Ok::<Option<u32>, Infallible>(None)
                })
                .await
        })
        .await;
        assert!(joined.unwrap_err().is_panic());

        let started = Instant::now();
        let loaded = orch
            .get_or_load("activities", "a:7", Duration::from_secs(60), |_| async {
                Ok::<_, Infallible>(Some(7u32))
            })
            .await
            .unwrap();

        assert_eq!(loaded, Loaded { value: Some(7), source: Source::Loader });
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_load_releases_lock() {
        let orch = orchestrator();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            orch.get_or_load("activities", "a:8", Duration::from_secs(60), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Infallible>(Some(1u32))
            }),
        )
        .await;
        assert!(cancelled.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let lock_key = orch.lock_key("activities", "a:8");
        assert!(orch.lock().holder(&lock_key).await.unwrap().is_none());
    }
}
