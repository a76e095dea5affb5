//! Provider rate limiting configuration.

/// Request budget for a provider.
///
/// Keeps us below the provider's published quota so we get throttled locally
/// (and fall back to cached or mock data) instead of getting banned.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Token bucket capacity (allowed burst).
    pub burst_capacity: f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 10.0,
        }
    }
}
