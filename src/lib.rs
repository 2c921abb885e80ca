//! lockaside - cache-aside loading with distributed single-flight locks
//!
//! Many processes share one logical cache through a key-value store. This
//! library provides:
//! - `get_or_load`: read the cache, and on a miss run the loader at most once
//!   per key across every process, guarded by a lease-based lock
//! - Negative caching of "no such data" results to stop cache penetration
//! - Bounded waiting for callers that lose the race for the lock
//! - Degraded mode: when the cache tier fails, the loader still answers
//!
//! # Example
//!
//! ```ignore
//! use lockaside::{Cache, CacheOrchestrator, LoaderConfig, RedisStore, RedisStoreConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisStoreConfig::new("redis://localhost:6379");
//!     let store = Arc::new(RedisStore::new(config).await?);
//!     let orchestrator = CacheOrchestrator::new(store, LoaderConfig::from_env());
//!
//!     let activities: Cache<String> =
//!         Cache::new("activities", orchestrator, Duration::from_secs(60));
//!
//!     // Concurrent callers for the same key share one load
//!     let activity = activities.get_or_load("activity:1001", |id| async move {
//!         // Load from database - 'id' is "activity:1001"
//!         Ok::<_, std::io::Error>(Some(format!("Activity {}", id)))
//!     }).await?;
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod lock;
mod orchestrator;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use cache::Cache;
pub use config::LoaderConfig;
pub use entry::{Cached, Entry, StorageMode, StoredEntry};
pub use error::{BoxError, CacheError, LoadError};
pub use lock::{DistributedLock, LockLease};
pub use orchestrator::{CacheOrchestrator, Loaded, Source};
pub use store::Store;
pub use stores::memory::HashMapStore;
pub use stores::metrics::{CacheMetric, MetricsSink, MetricsStore, ReadOutcome};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
