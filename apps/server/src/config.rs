use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub upstream_base_url: Option<String>,
    pub upstream_api_key: Option<String>,
    pub upstream_timeout: Duration,
    pub upstream_requests_per_minute: u32,
    pub upstream_burst: u32,
    pub cache_max_age: Duration,
    pub cache_max_access_count: Option<u64>,
    pub event_queue_capacity: usize,
    pub mock_fixtures_dir: Option<PathBuf>,
    /// Synthesize placeholder bodies for endpoints without a fixture.
    pub mock_placeholders: bool,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = var("RH_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid RH_LISTEN_ADDR")?;
        let cors_allow = var("RH_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = parsed("RH_REQUEST_TIMEOUT_MS", 30000);
        let upstream_timeout_ms: u64 = parsed("RH_UPSTREAM_TIMEOUT_MS", 5000);
        let max_age_secs: u64 = parsed("RH_CACHE_MAX_AGE_SECS", 300);

        Ok(Self {
            listen_addr,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            upstream_base_url: var("RH_UPSTREAM_BASE_URL"),
            upstream_api_key: var("RH_UPSTREAM_API_KEY"),
            upstream_timeout: Duration::from_millis(upstream_timeout_ms),
            upstream_requests_per_minute: parsed("RH_UPSTREAM_REQUESTS_PER_MINUTE", 60),
            upstream_burst: parsed("RH_UPSTREAM_BURST", 10),
            cache_max_age: Duration::from_secs(max_age_secs),
            cache_max_access_count: var("RH_CACHE_MAX_ACCESS_COUNT").and_then(|v| v.parse().ok()),
            event_queue_capacity: parsed("RH_EVENT_QUEUE_CAPACITY", 256).max(1),
            mock_fixtures_dir: var("RH_MOCK_FIXTURES_DIR").map(PathBuf::from),
            mock_placeholders: parsed("RH_MOCK_PLACEHOLDERS", true),
        })
    }
}

impl Default for Config {
    /// Defaults with no live provider configured.
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_millis(30000),
            upstream_base_url: None,
            upstream_api_key: None,
            upstream_timeout: Duration::from_millis(5000),
            upstream_requests_per_minute: 60,
            upstream_burst: 10,
            cache_max_age: Duration::from_secs(300),
            cache_max_access_count: None,
            event_queue_capacity: 256,
            mock_fixtures_dir: None,
            mock_placeholders: true,
        }
    }
}
