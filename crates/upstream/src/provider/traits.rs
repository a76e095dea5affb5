//! Provider trait definitions.

use async_trait::async_trait;

use crate::errors::UpstreamError;
use crate::models::{UpstreamRequest, UpstreamResponse};

use super::capabilities::RateLimit;

/// Trait for upstream data providers.
///
/// A provider performs exactly one call per `fetch` and reports failures
/// faithfully; throttling, circuit breaking and timeouts are layered on by
/// the gateway.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Unique identifier, used for logging and breaker/limiter bookkeeping.
    fn id(&self) -> &'static str;

    /// Request budget that should be applied when calling this provider.
    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    /// Perform the call.
    ///
    /// Must return `Err` for non-2xx answers so callers never cache an
    /// error page as a live response.
    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// The live-fetch capability handed to the cache arbiter.
///
/// May fail or time out; the arbiter treats every error as "live
/// unavailable" and falls back.
#[async_trait]
pub trait LiveFetcher: Send + Sync {
    async fn fetch_live(&self, request: &UpstreamRequest)
        -> Result<UpstreamResponse, UpstreamError>;
}
