//! Live/cached/mock source arbitration.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};

use rosterhub_upstream::{
    Headers, LiveFetcher, MockSource, UpstreamError, UpstreamRequest, UpstreamResponse,
};

use super::cache_model::{CacheEntry, CacheKey, CacheSource, PutOutcome};
use super::cache_traits::CacheStore;
use super::freshness::FreshnessPolicy;
use crate::errors::{Error, Result};
use crate::events::{Event, EventKind, EventSink};

/// The answer handed back to the caller of [`SourceArbiter::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
    pub status: u16,
    pub body: String,
    pub headers: Headers,
    pub source: CacheSource,
    /// True when a stale entry was served because the live fetch failed.
    pub served_stale: bool,
}

impl Resolved {
    fn from_entry(entry: &CacheEntry, served_stale: bool) -> Self {
        Self {
            status: entry.status,
            body: entry.body.clone(),
            headers: entry.headers.clone(),
            source: entry.source,
            served_stale,
        }
    }
}

/// Decides, per request, whether the answer comes from the cache, the live
/// provider or the mock source, and announces cache state changes.
pub struct SourceArbiter {
    store: Arc<dyn CacheStore>,
    mock: Arc<dyn MockSource>,
    sink: Arc<dyn EventSink>,
}

impl SourceArbiter {
    pub fn new(
        store: Arc<dyn CacheStore>,
        mock: Arc<dyn MockSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { store, mock, sink }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Resolves one request.
    ///
    /// Order of preference: a fresh active entry, a live fetch, the existing
    /// entry even if stale, then a mock response. Fails only when live and
    /// mock both fail and nothing is cached.
    pub async fn resolve(
        &self,
        operation: &str,
        endpoint: &str,
        params: BTreeMap<String, String>,
        policy: &dyn FreshnessPolicy,
        fetcher: &dyn LiveFetcher,
    ) -> Result<Resolved> {
        let request = UpstreamRequest {
            operation: operation.to_string(),
            endpoint: endpoint.to_string(),
            params,
        };
        self.resolve_request(&request, policy, fetcher).await
    }

    pub async fn resolve_request(
        &self,
        request: &UpstreamRequest,
        policy: &dyn FreshnessPolicy,
        fetcher: &dyn LiveFetcher,
    ) -> Result<Resolved> {
        let key = CacheKey::from_request(request);
        let existing = self.store.get(&key);

        if let Some(entry) = &existing {
            if policy.is_fresh(entry, Utc::now()) {
                match self.store.record_hit(&key) {
                    Ok(entry) => {
                        debug!("Cache hit '{}' (count={})", key, entry.access_count);
                        return Ok(Resolved::from_entry(&entry, false));
                    }
                    // Deactivated in between; treat as a miss.
                    Err(Error::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        let live_err = match fetch_checked(fetcher, request).await {
            Ok(response) => {
                let outcome = self.store.put(&key, response, CacheSource::Live)?;
                self.announce(&outcome);
                return Ok(Resolved::from_entry(&outcome.entry, false));
            }
            Err(err) => err,
        };

        if existing.is_some() {
            if let Ok(entry) = self.store.record_hit(&key) {
                info!(
                    "Live fetch for '{}' failed ({}), serving stale {} entry",
                    key, live_err, entry.source
                );
                return Ok(Resolved::from_entry(&entry, true));
            }
        }

        match self.mock.synthesize(request) {
            Ok(response) => {
                warn!("Live fetch for '{}' failed ({}), using mock", key, live_err);
                let outcome = self.store.put(&key, response, CacheSource::Mock)?;
                self.announce(&outcome);
                Ok(Resolved::from_entry(&outcome.entry, false))
            }
            Err(mock_err) => {
                warn!(
                    "No source available for '{}': live={}, mock={}",
                    key, live_err, mock_err
                );
                Err(Error::UpstreamUnavailable {
                    key: key.to_string(),
                    live: live_err,
                    mock: mock_err,
                })
            }
        }
    }

    fn announce(&self, outcome: &PutOutcome) {
        if !outcome.is_state_change() {
            return;
        }
        let entry = &outcome.entry;
        let kind = EventKind::for_cache_operation(&entry.key.operation);
        let message = if outcome.created {
            format!("{} cached from {}", entry.key, entry.source)
        } else {
            format!("{} refreshed from {}", entry.key, entry.source)
        };
        let payload = match json!({
            "operation": entry.key.operation,
            "endpoint": entry.key.endpoint,
            "source": entry.source,
            "status": entry.status,
            "created": outcome.created,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.sink
            .emit(Event::new(kind, entry.key.subject(), message).with_payload(payload));
    }
}

/// Non-2xx answers count as failures even if the fetcher let them through.
async fn fetch_checked(
    fetcher: &dyn LiveFetcher,
    request: &UpstreamRequest,
) -> std::result::Result<UpstreamResponse, UpstreamError> {
    let response = fetcher.fetch_live(request).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(UpstreamError::Status {
            provider: "live".into(),
            status: response.status,
        })
    }
}
