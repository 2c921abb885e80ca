use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use crate::entry::Cached;
use crate::error::{BoxError, CacheError, LoadError};
use crate::orchestrator::{CacheOrchestrator, Loaded};

/// Typed cache handle bound to one namespace and one default TTL.
///
/// `Cache` is a thin view over a `CacheOrchestrator`: the same orchestrator
/// (and therefore the same store) can back many `Cache<V>` instances with
/// different value types.
pub struct Cache<V> {
    namespace: String,
    orchestrator: CacheOrchestrator,
    ttl: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Cache {
            namespace: self.namespace.clone(),
            orchestrator: self.orchestrator.clone(),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a new Cache.
    ///
    /// # Arguments
    /// * `namespace` - The namespace string to isolate this cache
    /// * `orchestrator` - Shared orchestrator (store, lock and timing config)
    /// * `ttl` - Lifetime of loaded values
    ///
    /// # Example
    /// ```ignore
    /// let config = RedisStoreConfig::new("redis://localhost:6379");
    /// let store = Arc::new(RedisStore::new(config).await?);
    /// let orchestrator = CacheOrchestrator::new(store, LoaderConfig::from_env());
    ///
    /// let activities: Cache<Activity> =
    ///     Cache::new("activities", orchestrator.clone(), Duration::from_secs(60));
    /// ```
    pub fn new(namespace: &str, orchestrator: CacheOrchestrator, ttl: Duration) -> Self {
        Cache {
            namespace: namespace.to_string(),
            orchestrator,
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return the cached value.
    ///
    /// Returns `None` for cache misses and for keys cached as absent.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let cached = self.orchestrator.peek::<V>(&self.namespace, key).await?;
        Ok(cached.and_then(Cached::into_value))
    }

    /// Set the value in the cache with the default TTL.
    pub async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.orchestrator
            .put(&self.namespace, key, value, self.ttl)
            .await
    }

    /// Set the value in the cache with a custom TTL.
    pub async fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.orchestrator.put(&self.namespace, key, value, ttl).await
    }

    /// Remove the key from the cache, including a negative entry.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.orchestrator.invalidate(&self.namespace, key).await
    }

    /// Get the cached value or load it, caching the result.
    ///
    /// `Ok(None)` means the key has no backing data.
    ///
    /// # Example
    /// ```ignore
    /// let activity = activities.get_or_load("activity:1001", |key| async move {
    ///     db.find_activity(&key).await
    /// }).await?;
    /// ```
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, loader: F) -> Result<Option<V>, LoadError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        Ok(self.load(key, loader).await?.value)
    }

    /// `get_or_load` with a TTL other than this cache's default.
    pub async fn get_or_load_with_ttl<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<V>, LoadError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        let loaded = self
            .orchestrator
            .get_or_load(&self.namespace, key, ttl, loader)
            .await?;
        Ok(loaded.value)
    }

    /// `get_or_load` keeping the source tag, e.g. to report degraded answers.
    pub async fn load<F, Fut, E>(&self, key: &str, loader: F) -> Result<Loaded<V>, LoadError>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Into<BoxError>,
    {
        self.orchestrator
            .get_or_load(&self.namespace, key, self.ttl, loader)
            .await
    }
}
