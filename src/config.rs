use std::env;
use std::time::Duration;

/// Timing knobs for the get-or-load protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How long a population lock survives without an explicit release.
    ///
    /// Default: 10s
    pub lock_lease_ttl: Duration,

    /// How long a negative entry suppresses reloads of a key with no backing data.
    ///
    /// Default: 5 minutes
    pub penetration_ttl: Duration,

    /// Wait between attempts while another caller holds the lock.
    ///
    /// Default: 100ms
    pub retry_backoff: Duration,

    /// Total time a caller may spend waiting for the lock before giving up.
    ///
    /// Default: 3s
    pub max_wait_budget: Duration,

    /// Maximum number of failed lock attempts before giving up.
    ///
    /// Default: 64
    pub max_retries: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            lock_lease_ttl: Duration::from_secs(10),
            penetration_ttl: Duration::from_secs(5 * 60),
            retry_backoff: Duration::from_millis(100),
            max_wait_budget: Duration::from_secs(3),
            max_retries: 64,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by environment variables:
    ///
    /// - `LOCKASIDE_LOCK_LEASE_TTL_MS`
    /// - `LOCKASIDE_PENETRATION_TTL_MS`
    /// - `LOCKASIDE_RETRY_BACKOFF_MS`
    /// - `LOCKASIDE_MAX_WAIT_BUDGET_MS`
    /// - `LOCKASIDE_MAX_RETRIES`
    ///
    /// Unset or unparsable variables keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        LoaderConfig {
            lock_lease_ttl: env_ms("LOCKASIDE_LOCK_LEASE_TTL_MS")
                .unwrap_or(defaults.lock_lease_ttl),
            penetration_ttl: env_ms("LOCKASIDE_PENETRATION_TTL_MS")
                .unwrap_or(defaults.penetration_ttl),
            retry_backoff: env_ms("LOCKASIDE_RETRY_BACKOFF_MS").unwrap_or(defaults.retry_backoff),
            max_wait_budget: env_ms("LOCKASIDE_MAX_WAIT_BUDGET_MS")
                .unwrap_or(defaults.max_wait_budget),
            max_retries: env_parse("LOCKASIDE_MAX_RETRIES").unwrap_or(defaults.max_retries),
        }
    }

    pub fn with_lock_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lock_lease_ttl = ttl;
        self
    }

    pub fn with_penetration_ttl(mut self, ttl: Duration) -> Self {
        self.penetration_ttl = ttl;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_wait_budget(mut self, budget: Duration) -> Self {
        self.max_wait_budget = budget;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable config value: {}={}", name, raw);
            None
        }
    }
}
