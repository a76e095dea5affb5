//! Cache module - entry model, store, freshness policies and the source arbiter.

mod arbiter;
mod cache_model;
mod cache_store;
mod cache_traits;
mod freshness;


// Re-export the public interface
pub use arbiter::{Resolved, SourceArbiter};
pub use cache_model::{CacheEntry, CacheKey, CacheSource, CacheStats, PutOutcome, RefreshChanges};
pub use cache_store::InMemoryCacheStore;
pub use cache_traits::CacheStore;
pub use freshness::*;
