use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rosterhub_core::{
    cache::{AllOf, CacheStore, InMemoryCacheStore, MaxAccessCount, MaxAge, SourceArbiter},
    events::{EventBus, SubscriptionDispatcher},
};
use rosterhub_upstream::{
    CircuitBreaker, FixtureMockSource, HttpProvider, RateLimit, UpstreamGateway,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Default freshness bounds, overridable per request.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessDefaults {
    pub max_age: Duration,
    pub max_access_count: Option<u64>,
}

impl FreshnessDefaults {
    /// Builds the policy for one request, preferring the request's overrides.
    pub fn policy(&self, max_age_secs: Option<u64>, max_access_count: Option<u64>) -> AllOf {
        let max_age_secs = max_age_secs.unwrap_or(self.max_age.as_secs());
        let policy = AllOf::new().with(MaxAge::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ));
        match max_access_count.or(self.max_access_count) {
            Some(limit) => policy.with(MaxAccessCount(limit)),
            None => policy,
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn CacheStore>,
    pub arbiter: SourceArbiter,
    pub gateway: UpstreamGateway,
    pub event_bus: EventBus,
    pub dispatcher: SubscriptionDispatcher,
    pub freshness: FreshnessDefaults,
    pub started_at: DateTime<Utc>,
}

pub fn init_tracing() {
    let log_format = std::env::var("RH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let gateway = match &config.upstream_base_url {
        Some(base_url) => {
            tracing::info!("Live provider: {}", base_url);
            let provider = HttpProvider::new(
                base_url.clone(),
                config.upstream_api_key.clone(),
                config.upstream_timeout,
            )
            .with_rate_limit(RateLimit {
                requests_per_minute: config.upstream_requests_per_minute,
                burst_capacity: f64::from(config.upstream_burst),
            });
            UpstreamGateway::with_parts(
                Some(Arc::new(provider)),
                CircuitBreaker::new(),
                config.upstream_timeout,
            )
        }
        None => {
            tracing::warn!("RH_UPSTREAM_BASE_URL not set; serving cached and mock data only");
            UpstreamGateway::disconnected()
        }
    };

    let mut mock = if config.mock_placeholders {
        FixtureMockSource::with_placeholders()
    } else {
        FixtureMockSource::new()
    };
    if let Some(dir) = &config.mock_fixtures_dir {
        mock.load_dir(dir)?;
    }

    let event_bus = EventBus::new(config.event_queue_capacity);
    let dispatcher = SubscriptionDispatcher::new(event_bus.clone());
    let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
    let arbiter = SourceArbiter::new(store.clone(), Arc::new(mock), Arc::new(event_bus.clone()));

    Ok(Arc::new(AppState {
        store,
        arbiter,
        gateway,
        event_bus,
        dispatcher,
        freshness: FreshnessDefaults {
            max_age: config.cache_max_age,
            max_access_count: config.cache_max_access_count,
        },
        started_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterhub_core::cache::{CacheEntry, CacheKey, CacheSource, FreshnessPolicy};
    use rosterhub_upstream::{UpstreamRequest, UpstreamResponse};

    fn entry_with_count(count: u64) -> CacheEntry {
        let key = CacheKey::from_request(&UpstreamRequest::new("character", "characters/zed"));
        let mut entry = CacheEntry::new(key, UpstreamResponse::new(200, "{}"), CacheSource::Live);
        entry.access_count = count;
        entry
    }

    #[test]
    fn test_request_overrides_win() {
        let defaults = FreshnessDefaults {
            max_age: Duration::from_secs(300),
            max_access_count: Some(2),
        };
        let now = Utc::now();

        assert!(defaults.policy(None, None).is_fresh(&entry_with_count(1), now));
        assert!(!defaults.policy(None, None).is_fresh(&entry_with_count(2), now));
        assert!(defaults.policy(None, Some(10)).is_fresh(&entry_with_count(2), now));

        let later = now + chrono::Duration::seconds(60);
        assert!(!defaults.policy(Some(30), Some(10)).is_fresh(&entry_with_count(1), later));
    }
}
