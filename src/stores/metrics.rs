//! Metrics middleware for cache stores.
//!
//! This module provides a `MetricsStore` wrapper that emits metrics for all
//! store operations (reads, writes, removes and lease operations) to a
//! user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lockaside::{CacheOrchestrator, LoaderConfig, MokaStore, MokaStoreConfig, Store};
//! use lockaside::{CacheMetric, MetricsSink, MetricsStore};
//!
//! // Create metrics sink
//! let sink = Arc::new(MyMetricsSink::new());
//!
//! // Wrap store with metrics
//! let moka = Arc::new(MokaStore::new(MokaStoreConfig::default()));
//! let store: Arc<dyn Store> = Arc::new(MetricsStore::new(moka, sink.clone()));
//!
//! // Metrics emitted automatically
//! let orchestrator = CacheOrchestrator::new(store, LoaderConfig::default());
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;

/// What a read found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No live entry.
    Miss,
    /// A live value.
    Hit,
    /// A live negative entry.
    Negative,
    /// The store failed.
    Failed,
}

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every cache read (get) operation.
    Read {
        /// The cache key that was read.
        key: String,
        outcome: ReadOutcome,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
        /// The namespace of the cache operation.
        namespace: String,
    },
    /// Emitted on every cache write (set) operation.
    Write {
        /// The cache key that was written.
        key: String,
        /// Whether a negative entry was written.
        negative: bool,
        failed: bool,
        latency_ms: f64,
        tier: String,
        namespace: String,
    },
    /// Emitted on every cache remove operation.
    Remove {
        /// Number of keys in the remove batch.
        key_count: usize,
        /// First key in the batch (for debugging/identification).
        first_key: Option<String>,
        failed: bool,
        latency_ms: f64,
        tier: String,
        namespace: String,
    },
    /// Emitted on every lease acquisition attempt.
    Acquire {
        lock_key: String,
        granted: bool,
        failed: bool,
        latency_ms: f64,
        tier: String,
    },
    /// Emitted on every lease release.
    Release {
        lock_key: String,
        /// False when the lease had already lapsed or changed hands.
        released: bool,
        failed: bool,
        latency_ms: f64,
        tier: String,
    },
}

/// Trait for receiving cache metrics.
///
/// Implement this trait to collect metrics from `MetricsStore`.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of cache operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: CacheMetric);

    /// Flush any buffered metrics.
    ///
    /// Called when the caller wants to ensure all metrics are persisted.
    /// This is typically called at shutdown or at periodic intervals.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A store wrapper that emits metrics for all operations.
///
/// `MetricsStore` wraps any `Store` implementation and emits metrics to a
/// user-provided sink. Results are passed through untouched.
pub struct MetricsStore {
    inner: Arc<dyn Store>,
    sink: Arc<dyn MetricsSink>,
    tier_name: String,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given store.
    ///
    /// # Arguments
    /// * `inner` - The store to wrap
    /// * `sink` - The metrics sink to emit metrics to
    pub fn new(inner: Arc<dyn Store>, sink: Arc<dyn MetricsSink>) -> Self {
        let tier_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            tier_name,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Store for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(namespace, key).await;
        let latency_ms = Self::elapsed_ms(start);

        let outcome = match &result {
            Ok(Some(entry)) if entry.is_absent() => ReadOutcome::Negative,
            Ok(Some(_)) => ReadOutcome::Hit,
            Ok(None) => ReadOutcome::Miss,
            Err(_) => ReadOutcome::Failed,
        };

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            outcome,
            latency_ms,
            tier: self.tier_name.clone(),
            namespace: namespace.to_string(),
        });

        result
    }

    async fn set(&self, namespace: &str, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let negative = entry.is_absent();
        let start = Instant::now();
        let result = self.inner.set(namespace, key, entry).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            negative,
            failed: result.is_err(),
            latency_ms,
            tier: self.tier_name.clone(),
            namespace: namespace.to_string(),
        });

        result
    }

    async fn remove(&self, namespace: &str, keys: &[&str]) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.remove(namespace, keys).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Remove {
            key_count: keys.len(),
            first_key: keys.first().map(|k| k.to_string()),
            failed: result.is_err(),
            latency_ms,
            tier: self.tier_name.clone(),
            namespace: namespace.to_string(),
        });

        result
    }

    async fn try_acquire(
        &self,
        lock_key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.inner.try_acquire(lock_key, token, ttl).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Acquire {
            lock_key: lock_key.to_string(),
            granted: matches!(result, Ok(true)),
            failed: result.is_err(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn release(&self, lock_key: &str, token: &str) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.inner.release(lock_key, token).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Release {
            lock_key: lock_key.to_string(),
            released: matches!(result, Ok(true)),
            failed: result.is_err(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn lease_holder(&self, lock_key: &str) -> Result<Option<String>, CacheError> {
        self.inner.lease_holder(lock_key).await
    }
}
