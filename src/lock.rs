//! Lease-based mutual exclusion across processes sharing one store.
//!
//! A lock is a store key holding the owner's token with a TTL. A crashed
//! holder's lease runs out on its own, and a slow holder can lose its lease
//! mid-work. Release is always a compare-and-delete on the owner's token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::store::Store;
use crate::utils::{expires_in, new_token};

/// A granted lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// The lock key.
    pub resource_key: String,
    /// The token proving ownership. Required to release.
    pub holder_token: String,
    /// Unix timestamp in milliseconds after which the lease lapses on its own.
    pub expires_at: i64,
}

/// Distributed lock built on a store's atomic lease primitives.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn Store>,
}

impl DistributedLock {
    /// Create a lock manager over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        DistributedLock { store }
    }

    /// Try once to take the lease on `resource_key` for `owner_token`.
    ///
    /// Fails closed: a store error counts as "not acquired". No retries.
    pub async fn acquire(
        &self,
        resource_key: &str,
        owner_token: &str,
        lease_ttl: Duration,
    ) -> bool {
        match self.try_acquire(resource_key, owner_token, lease_ttl).await {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(
                    "Lock acquisition failed, treating as not acquired: resource={}, error={}",
                    resource_key,
                    e
                );
                false
            }
        }
    }

    /// Like `acquire`, but hands store errors back to the caller.
    pub async fn try_acquire(
        &self,
        resource_key: &str,
        owner_token: &str,
        lease_ttl: Duration,
    ) -> Result<bool, CacheError> {
        let granted = self
            .store
            .try_acquire(resource_key, owner_token, lease_ttl)
            .await?;
        if granted {
            tracing::debug!(
                "Lock acquired: resource={}, ttl={:?}",
                resource_key,
                lease_ttl
            );
        }
        Ok(granted)
    }

    /// Take a lease under a freshly minted token.
    pub async fn lease(
        &self,
        resource_key: &str,
        lease_ttl: Duration,
    ) -> Result<Option<LockLease>, CacheError> {
        let token = new_token();
        let expires_at = expires_in(lease_ttl);
        if !self.try_acquire(resource_key, &token, lease_ttl).await? {
            return Ok(None);
        }
        Ok(Some(LockLease {
            resource_key: resource_key.to_string(),
            holder_token: token,
            expires_at,
        }))
    }

    /// Release the lease if `owner_token` still holds it.
    ///
    /// When the lease already lapsed and was taken by someone else this is a
    /// no-op. Errors are logged, never returned: an unreleased lease expires.
    pub async fn release(&self, resource_key: &str, owner_token: &str) {
        match self.store.release(resource_key, owner_token).await {
            Ok(true) => {
                tracing::debug!("Lock released: resource={}", resource_key);
            }
            Ok(false) => {
                tracing::debug!(
                    "Lock no longer held by this owner, nothing released: resource={}",
                    resource_key
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to release lock, it will expire on its own: resource={}, error={}",
                    resource_key,
                    e
                );
            }
        }
    }

    /// Token of the current live lease on `resource_key`.
    pub async fn holder(&self, resource_key: &str) -> Result<Option<String>, CacheError> {
        self.store.lease_holder(resource_key).await
    }

    /// Run `work` while holding the lease on `resource_key`.
    ///
    /// Returns `Ok(None)` without running `work` when someone else holds the
    /// lease. The lease is released after `work` finishes.
    ///
    /// # Example
    /// ```ignore
    /// let guard_key = format!("enroll_lock:{}:{}", user_id, activity_id);
    /// match lock.run_exclusive(&guard_key, Duration::from_secs(10), submit()).await? {
    ///     Some(receipt) => Ok(receipt),
    ///     None => Err(AlreadySubmitting),
    /// }
    /// ```
    pub async fn run_exclusive<T, Fut>(
        &self,
        resource_key: &str,
        lease_ttl: Duration,
        work: Fut,
    ) -> Result<Option<T>, CacheError>
    where
        Fut: Future<Output = T>,
    {
        let Some(lease) = self.lease(resource_key, lease_ttl).await? else {
            return Ok(None);
        };

        let guard = self.guard(&lease.resource_key, &lease.holder_token);
        let output = work.await;
        guard.release().await;
        Ok(Some(output))
    }

    /// Guard that releases the lease when dropped unreleased, e.g. when the
    /// holder panics or its future is cancelled.
    pub(crate) fn guard(&self, resource_key: &str, owner_token: &str) -> ReleaseGuard {
        ReleaseGuard {
            lock: self.clone(),
            pending: Some((resource_key.to_string(), owner_token.to_string())),
        }
    }
}

/// Owns a granted lease until `release` is awaited or the guard is dropped.
pub(crate) struct ReleaseGuard {
    lock: DistributedLock,
    pending: Option<(String, String)>,
}

impl ReleaseGuard {
    pub(crate) async fn release(mut self) {
        if let Some((resource_key, owner_token)) = self.pending.take() {
            self.lock.release(&resource_key, &owner_token).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some((resource_key, owner_token)) = self.pending.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Releasing abandoned lock: resource={}", resource_key);
                let lock = self.lock.clone();
                handle.spawn(async move {
                    lock.release(&resource_key, &owner_token).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    "No runtime to release abandoned lock, leaving it to expire: resource={}",
                    resource_key
                );
            }
        }
    }
}
