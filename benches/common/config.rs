use std::env;

/// Benchmark knobs read from the environment.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Redis URL for the optional Redis runs (`REDIS_URL`, unset skips them)
    pub redis_url: Option<String>,

    /// Simulated loader latency in milliseconds (`LOADER_LATENCY_MS`, default 20)
    pub loader_latency_ms: u64,

    /// Concurrent callers per stampede (`STAMPEDE_CALLERS`, default 64)
    pub stampede_callers: usize,

    /// Criterion sample size (`BENCH_SAMPLE_SIZE`, default 50)
    pub sample_size: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").ok(),
            loader_latency_ms: env_or("LOADER_LATENCY_MS", 20),
            stampede_callers: env_or("STAMPEDE_CALLERS", 64),
            sample_size: env_or("BENCH_SAMPLE_SIZE", 50),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!("Benchmark Configuration:");
        eprintln!("  Redis URL: {}", config.redis_url.as_deref().unwrap_or("(skipped)"));
        eprintln!("  Loader Latency: {}ms", config.loader_latency_ms);
        eprintln!("  Stampede Callers: {}", config.stampede_callers);
        eprintln!("  Sample Size: {}", config.sample_size);
        config
    }
}
