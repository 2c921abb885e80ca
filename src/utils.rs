//! Shared utilities for the cache library.

use std::fmt::Display;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Build a composite cache key from namespace and key.
///
/// Format: `cache:{namespace}::{key}`. The prefix keeps cache keys disjoint
/// from lock keys in a shared keyspace, whatever the namespace.
pub fn build_cache_key<N: Display + ?Sized>(namespace: &N, key: &str) -> String {
    format!("cache:{}::{}", namespace, key)
}

/// Build the lock key guarding population of a cache key.
///
/// Format: `lock:{namespace}::{key}`
pub fn build_lock_key<N: Display + ?Sized>(namespace: &N, key: &str) -> String {
    format!("lock:{}::{}", namespace, key)
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Unix millisecond timestamp `ttl` from now.
pub fn expires_in(ttl: Duration) -> i64 {
    now_ms().saturating_add(duration_ms(ttl))
}

/// Milliseconds in `d`, saturating at `i64::MAX`.
pub fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// A fresh, globally unique lease token.
pub fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
