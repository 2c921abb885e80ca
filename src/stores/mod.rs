//! Store implementations for the cache library.

pub mod memory;
pub mod metrics;
pub mod moka;
pub mod redis;

pub use self::memory::HashMapStore;
pub use self::metrics::{CacheMetric, MetricsSink, MetricsStore, ReadOutcome};
pub use self::moka::{MokaStore, MokaStoreConfig};
pub use self::redis::{RedisStore, RedisStoreConfig};
