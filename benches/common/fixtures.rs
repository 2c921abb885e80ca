use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Cached record used by the benchmarks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchActivity {
    pub id: u64,
    pub title: String,
    pub quota: u32,
    pub enrolled: Vec<u64>,
}

impl BenchActivity {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            title: format!("Activity {}", id),
            quota: (id % 200) as u32 + 10,
            enrolled: (0..(id % 8)).collect(),
        }
    }
}

/// Backing store stand-in with fixed latency. Keys past `num_activities` have no data.
#[derive(Clone)]
pub struct FakeDatabase {
    data: Arc<HashMap<String, BenchActivity>>,
    latency: Duration,
    query_count: Arc<AtomicUsize>,
}

impl FakeDatabase {
    pub fn new(num_activities: usize, latency_ms: u64) -> Self {
        let data = (0..num_activities)
            .map(|i| (format!("activity:{}", i), BenchActivity::new(i as u64)))
            .collect();

        Self {
            data: Arc::new(data),
            latency: Duration::from_millis(latency_ms),
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn find(&self, key: &str) -> Result<Option<BenchActivity>, Infallible> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        Ok(self.data.get(key).cloned())
    }

    /// Loader closure for `get_or_load` backed by this database
    pub fn loader(
        &self,
    ) -> impl FnOnce(String) -> BoxFuture<'static, Result<Option<BenchActivity>, Infallible>>
    + Send
    + 'static {
        let db = self.clone();
        move |key| Box::pin(async move { db.find(&key).await })
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    pub fn reset_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }
}

/// Key sets for the workloads
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        Self { num_keys }
    }

    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| format!("activity:{}", i)).collect()
    }

    /// Uniformly drawn keys, all present in the database
    pub fn uniform_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| format!("activity:{}", rng.gen_range(0..self.num_keys)))
            .collect()
    }

    /// Keys guaranteed to miss the database
    pub fn missing(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("activity:{}", self.num_keys + i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_database() {
        let db = FakeDatabase::new(10, 0);

        assert_eq!(db.find("activity:3").await.unwrap().unwrap().id, 3);
        assert!(db.find("activity:10").await.unwrap().is_none());
        assert_eq!(db.query_count(), 2);

        db.reset_count();
        assert_eq!(db.query_count(), 0);
    }

    #[test]
    fn test_key_generator() {
        let key_gen = KeyGenerator::new(100);

        let seq = key_gen.sequential();
        assert_eq!(seq.len(), 100);
        assert_eq!(seq[0], "activity:0");

        assert_eq!(key_gen.uniform_random(50).len(), 50);
        assert_eq!(key_gen.missing(2), vec!["activity:100", "activity:101"]);
    }
}
