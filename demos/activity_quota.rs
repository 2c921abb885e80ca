//! Activity lookups and enrollment guarded by Redis.
//!
//! Concurrent readers of the same activity hit the database once, unknown
//! activity ids are remembered as absent, and a per-user enrollment lock
//! rejects duplicate submissions.
//!
//! Run with:
//!
//! ```text
//! REDIS_URL=redis://localhost:6379 RUST_LOG=lockaside=debug cargo run --example activity_quota
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lockaside::{Cache, CacheOrchestrator, LoaderConfig, RedisStore, RedisStoreConfig};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Activity {
    id: String,
    title: String,
    quota: u32,
    enrolled: u32,
}

/// Stand-in for the activity table.
#[derive(Clone, Default)]
struct ActivityTable {
    rows: Arc<Mutex<HashMap<String, Activity>>>,
    queries: Arc<AtomicUsize>,
}

impl ActivityTable {
    async fn find(&self, id: String) -> Result<Option<Activity>, Infallible> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn enroll(&self, id: &str) -> bool {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut rows = self.rows.lock().await;
        match rows.get_mut(id) {
            Some(activity) if activity.enrolled < activity.quota => {
                activity.enrolled += 1;
                true
            }
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let store = Arc::new(RedisStore::new(RedisStoreConfig::new(url)).await?);
    let orchestrator = CacheOrchestrator::new(store, LoaderConfig::from_env());
    let activities: Cache<Activity> =
        Cache::new("activities", orchestrator.clone(), Duration::from_secs(60));

    let table = ActivityTable::default();
    table.rows.lock().await.insert(
        "act-7".to_string(),
        Activity {
            id: "act-7".to_string(),
            title: "Spring Hackathon".to_string(),
            quota: 2,
            enrolled: 0,
        },
    );
    activities.remove("act-7").await?;
    activities.remove("act-404").await?;

    // Twenty readers miss at once; one of them queries the table
    let readers: Vec<_> = (0..20)
        .map(|_| {
            let activities = activities.clone();
            let table = table.clone();
            tokio::spawn(async move { activities.get_or_load("act-7", |id| table.find(id)).await })
        })
        .collect();
    for reader in readers {
        let activity = reader.await??;
        tracing::debug!("Reader got {:?}", activity.map(|a| a.title));
    }
    println!("Table queries after 20 concurrent reads: {}", table.queries.load(Ordering::SeqCst));

    // Unknown ids are cached as absent
    for _ in 0..3 {
        let missing = activities.get_or_load("act-404", |id| table.find(id)).await?;
        assert!(missing.is_none());
    }
    println!(
        "Table queries after 3 reads of an unknown id: {}",
        table.queries.load(Ordering::SeqCst)
    );

    // The same user double-clicks enroll; the second submission is rejected
    let lock = orchestrator.lock().clone();
    let guard_key = format!("enroll_lock:{}:{}", "user-42", "act-7");
    let (first, second) = tokio::join!(
        lock.run_exclusive(&guard_key, Duration::from_secs(10), table.enroll("act-7")),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            lock.run_exclusive(&guard_key, Duration::from_secs(10), table.enroll("act-7"))
                .await
        },
    );
    println!("First submission: {:?}", first?);
    println!(
        "Duplicate submission: {:?}",
        second?.map_or("rejected, already in progress", |_| "accepted")
    );

    // Enrollment changed the row, so drop the cached copy
    activities.remove("act-7").await?;
    let refreshed = activities.get_or_load("act-7", |id| table.find(id)).await?;
    println!("Activity after enrollment: {:?}", refreshed);

    Ok(())
}
