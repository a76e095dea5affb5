//! Cache domain models.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use rosterhub_upstream::{Headers, UpstreamRequest, UpstreamResponse};

/// Where a cached response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheSource {
    Live,
    Mock,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Mock => "MOCK",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request identity: operation kind, endpoint and normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub operation: String,
    pub endpoint: String,
    /// Sorted, percent-encoded `name=value` pairs joined with `&`.
    pub params: String,
}

impl CacheKey {
    pub fn from_request(request: &UpstreamRequest) -> Self {
        Self {
            operation: request.operation.trim().to_string(),
            endpoint: request.trimmed_endpoint().to_string(),
            params: request.normalized_params(),
        }
    }

    /// The key's logical subject, used as the target of change events.
    pub fn subject(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}:{}", self.operation, self.endpoint)
        } else {
            write!(f, "{}:{}?{}", self.operation, self.endpoint, self.params)
        }
    }
}

/// A cached upstream response plus its usage bookkeeping.
///
/// Only the cache store mutates entries, and only through [`CacheEntry::touch`]
/// and [`CacheEntry::refresh`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub status: u16,
    pub body: String,
    pub headers: Headers,
    pub created_at: DateTime<Utc>,
    /// Last time the response fields were written.
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Starts at 1 and grows by exactly one per reuse (hit or overwrite).
    pub access_count: u64,
    /// False once soft-evicted.
    pub active: bool,
    pub source: CacheSource,
}

/// What an overwrite changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshChanges {
    pub source_changed: bool,
    pub content_changed: bool,
}

impl CacheEntry {
    pub fn new(key: CacheKey, response: UpstreamResponse, source: CacheSource) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: response.status,
            body: response.body,
            headers: response.headers,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 1,
            active: true,
            source,
        }
    }

    /// Record one reuse of the entry.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Utc::now();
    }

    /// Replace the response fields and source, counting it as one reuse.
    pub fn refresh(&mut self, response: UpstreamResponse, source: CacheSource) -> RefreshChanges {
        let changes = RefreshChanges {
            source_changed: self.source != source,
            content_changed: self.status != response.status || self.body != response.body,
        };
        self.status = response.status;
        self.body = response.body;
        self.headers = response.headers;
        self.source = source;
        self.touch();
        self.updated_at = self.last_accessed_at;
        changes
    }

    /// Time since the response fields were last written.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }

    pub fn to_response(&self) -> UpstreamResponse {
        UpstreamResponse {
            status: self.status,
            body: self.body.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// Result of a cache write.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub entry: CacheEntry,
    pub created: bool,
    pub source_changed: bool,
    pub content_changed: bool,
}

impl PutOutcome {
    /// Whether subscribers should hear about this write.
    pub fn is_state_change(&self) -> bool {
        self.created || self.source_changed || self.content_changed
    }
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub live_entries: usize,
    pub mock_entries: usize,
    pub total_accesses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::from_request(
            &UpstreamRequest::new("character", "/characters/zed").with_param("realm", "eu"),
        )
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "character:characters/zed?realm=eu");

        let bare = CacheKey::from_request(&UpstreamRequest::new("party", "parties/1"));
        assert_eq!(bare.subject(), "party:parties/1");
    }

    #[test]
    fn test_key_ignores_param_insertion_order() {
        let a = UpstreamRequest::new("character", "characters")
            .with_param("b", "2")
            .with_param("a", "1");
        let b = UpstreamRequest::new("character", "characters")
            .with_param("a", "1")
            .with_param("b", "2");
        assert_eq!(CacheKey::from_request(&a), CacheKey::from_request(&b));
    }

    #[test]
    fn test_new_entry_starts_at_one() {
        let entry = CacheEntry::new(key(), UpstreamResponse::new(200, "{}"), CacheSource::Live);
        assert_eq!(entry.access_count, 1);
        assert!(entry.active);
        assert_eq!(entry.created_at, entry.last_accessed_at);
    }

    #[test]
    fn test_refresh_reports_changes() {
        let mut entry =
            CacheEntry::new(key(), UpstreamResponse::new(200, "{\"v\":1}"), CacheSource::Mock);

        let changes = entry.refresh(UpstreamResponse::new(200, "{\"v\":1}"), CacheSource::Live);
        assert!(changes.source_changed);
        assert!(!changes.content_changed);
        assert_eq!(entry.access_count, 2);

        let changes = entry.refresh(UpstreamResponse::new(200, "{\"v\":2}"), CacheSource::Live);
        assert!(!changes.source_changed);
        assert!(changes.content_changed);
        assert_eq!(entry.access_count, 3);
        assert_eq!(entry.body, "{\"v\":2}");
        assert_eq!(entry.updated_at, entry.last_accessed_at);
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(serde_json::to_string(&CacheSource::Live).unwrap(), "\"LIVE\"");
        assert_eq!(serde_json::to_string(&CacheSource::Mock).unwrap(), "\"MOCK\"");
    }
}
