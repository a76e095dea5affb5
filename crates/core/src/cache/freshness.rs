//! Freshness policies.
//!
//! The arbiter asks a policy whether an active entry may be served as-is or
//! must be refetched. Thresholds are deployment decisions, so policies are
//! injected rather than hard-coded.

use chrono::{DateTime, Utc};

use super::cache_model::CacheEntry;

pub trait FreshnessPolicy: Send + Sync {
    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool;
}

/// Fresh while the entry's content is younger than the limit.
///
/// Age counts from the last write; reads do not extend freshness.
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub chrono::Duration);

impl MaxAge {
    /// Saturates at the largest representable duration.
    pub fn seconds(seconds: i64) -> Self {
        Self(chrono::Duration::try_seconds(seconds).unwrap_or(chrono::Duration::MAX))
    }
}

impl FreshnessPolicy for MaxAge {
    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) < self.0
    }
}

/// Fresh until the entry has been used this many times.
#[derive(Debug, Clone, Copy)]
pub struct MaxAccessCount(pub u64);

impl FreshnessPolicy for MaxAccessCount {
    fn is_fresh(&self, entry: &CacheEntry, _now: DateTime<Utc>) -> bool {
        entry.access_count < self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFresh;

impl FreshnessPolicy for AlwaysFresh {
    fn is_fresh(&self, _entry: &CacheEntry, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// Forces a live fetch on every resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFresh;

impl FreshnessPolicy for NeverFresh {
    fn is_fresh(&self, _entry: &CacheEntry, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Fresh only if every inner policy agrees. Empty means fresh.
#[derive(Default)]
pub struct AllOf(pub Vec<Box<dyn FreshnessPolicy>>);

impl AllOf {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, policy: impl FreshnessPolicy + 'static) -> Self {
        self.0.push(Box::new(policy));
        self
    }
}

impl FreshnessPolicy for AllOf {
    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        self.0.iter().all(|policy| policy.is_fresh(entry, now))
    }
}
