use std::time::Duration;

/// Boxed error produced by a loader.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The store could not be reached (connection refused, dropped or timed out).
    #[error("[{tier}] store unavailable for key '{key}': {message}")]
    Unavailable {
        tier: String,
        key: String,
        message: String,
    },
    /// The store was reached but rejected the operation.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Create a new unavailable error.
    pub fn unavailable(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Unavailable {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the store itself is unreachable, as opposed to rejecting a request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable { .. })
    }
}

/// Error returned to callers of `get_or_load`.
///
/// Store faults never show up here: they put the call into degraded mode instead.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The lock stayed with another holder for the whole wait budget and no
    /// value became visible in the meantime. Safe to retry later.
    #[error("timed out waiting for lock on '{key}' after {attempts} attempts ({waited:?})")]
    LockContentionTimeout {
        key: String,
        attempts: u32,
        waited: Duration,
    },
    /// The loader failed. Nothing was cached.
    #[error("loader failed for key '{key}': {source}")]
    Loader {
        key: String,
        #[source]
        source: BoxError,
    },
}

impl LoadError {
    pub(crate) fn loader(key: &str, source: impl Into<BoxError>) -> Self {
        LoadError::Loader {
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// Whether retrying the same call later can succeed without any change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::LockContentionTimeout { .. })
    }

    /// The loader's own error, if this is a loader fault.
    pub fn into_loader_error(self) -> Option<BoxError> {
        match self {
            LoadError::Loader { source, .. } => Some(source),
            LoadError::LockContentionTimeout { .. } => None,
        }
    }
}
