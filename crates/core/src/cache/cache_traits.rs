//! Cache storage trait.

use super::cache_model::{CacheEntry, CacheKey, CacheSource, CacheStats, PutOutcome};
use crate::errors::Result;
use rosterhub_upstream::UpstreamResponse;

/// Storage interface for cached upstream responses.
///
/// Implementations must serialize `put`, `record_hit` and `deactivate` per
/// key so no update is lost, while operations on different keys proceed
/// independently.
pub trait CacheStore: Send + Sync {
    /// Active entry for `key`, if any. Does not touch access bookkeeping.
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Count one read of an active entry.
    ///
    /// Fails with `NotFound` if the key is absent or inactive.
    fn record_hit(&self, key: &CacheKey) -> Result<CacheEntry>;

    /// Create or overwrite the entry for `key`.
    ///
    /// A new (or previously deactivated) key starts with access count 1.
    /// Overwriting an active entry counts as one reuse.
    fn put(&self, key: &CacheKey, response: UpstreamResponse, source: CacheSource)
        -> Result<PutOutcome>;

    /// Soft-evict `key`. Returns whether the entry was active before the
    /// call; unknown keys and repeated calls are no-ops.
    fn deactivate(&self, key: &CacheKey) -> Result<bool>;

    /// Entries ordered by key, optionally including soft-evicted ones.
    fn list(&self, include_inactive: bool) -> Vec<CacheEntry>;

    fn stats(&self) -> CacheStats;
}
