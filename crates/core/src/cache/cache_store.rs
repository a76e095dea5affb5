//! In-memory cache store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};

use super::cache_model::{CacheEntry, CacheKey, CacheSource, CacheStats, PutOutcome};
use super::cache_traits::CacheStore;
use crate::errors::{Error, Result};
use rosterhub_upstream::UpstreamResponse;

/// Sharded in-memory store.
///
/// Per-key atomicity comes from the map's entry lock: every mutation of a key
/// happens while its shard guard is held, and nothing else is awaited or
/// locked under that guard.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.active)
            .map(|entry| entry.value().clone())
    }

    fn record_hit(&self, key: &CacheKey) -> Result<CacheEntry> {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.active => {
                entry.touch();
                Ok(entry.clone())
            }
            _ => Err(Error::NotFound(key.to_string())),
        }
    }

    fn put(
        &self,
        key: &CacheKey,
        response: UpstreamResponse,
        source: CacheSource,
    ) -> Result<PutOutcome> {
        let outcome = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.active {
                    let changes = entry.refresh(response, source);
                    PutOutcome {
                        entry: entry.clone(),
                        created: false,
                        source_changed: changes.source_changed,
                        content_changed: changes.content_changed,
                    }
                } else {
                    *entry = CacheEntry::new(key.clone(), response, source);
                    PutOutcome {
                        entry: entry.clone(),
                        created: true,
                        source_changed: false,
                        content_changed: false,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(CacheEntry::new(key.clone(), response, source));
                PutOutcome {
                    entry: entry.clone(),
                    created: true,
                    source_changed: false,
                    content_changed: false,
                }
            }
        };

        debug!(
            "Cache put '{}' source={} created={} count={}",
            key, source, outcome.created, outcome.entry.access_count
        );
        Ok(outcome)
    }

    fn deactivate(&self, key: &CacheKey) -> Result<bool> {
        let was_active = match self.entries.get_mut(key) {
            Some(mut entry) => std::mem::replace(&mut entry.active, false),
            None => false,
        };
        if was_active {
            info!("Cache entry '{}' deactivated", key);
        }
        Ok(was_active)
    }

    fn list(&self, include_inactive: bool) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .filter(|entry| include_inactive || entry.active)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.key.to_string());
        entries
    }

    fn stats(&self) -> CacheStats {
        self.entries
            .iter()
            .fold(CacheStats::default(), |mut stats, entry| {
                stats.total_entries += 1;
                stats.total_accesses += entry.access_count;
                if entry.active {
                    stats.active_entries += 1;
                    match entry.source {
                        CacheSource::Live => stats.live_entries += 1,
                        CacheSource::Mock => stats.mock_entries += 1,
                    }
                }
                stats
            })
    }
}
