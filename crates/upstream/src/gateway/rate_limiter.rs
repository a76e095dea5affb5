//! Token bucket rate limiter, one bucket per provider.
//!
//! The gateway never waits for a token: an empty bucket means the call is
//! refused right away so the caller can serve cached or mock data instead.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::ProviderId;
use crate::provider::RateLimit;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn from_limit(limit: &RateLimit) -> Self {
        let capacity = limit.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            rate: f64::from(limit.requests_per_minute) / 60.0,
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn wait_hint(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 || self.rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// Per-provider token buckets.
///
/// Buckets are created lazily from the limit registered with
/// [`configure`](Self::configure), or from [`RateLimit::default`].
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    limits: Mutex<HashMap<String, RateLimit>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
        }
    }

    // A poisoned lock only means a panic happened mid-refill; the bucket
    // numbers are still usable.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register the budget for a provider, discarding any existing bucket.
    pub fn configure(&self, provider: &ProviderId, limit: RateLimit) {
        self.lock_limits().insert(provider.to_string(), limit);
        self.lock_buckets().remove(provider.as_ref());
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        let limit = self.limit_for(provider);
        let mut buckets = self.lock_buckets();
        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::from_limit(&limit));

        let acquired = bucket.try_take();
        if !acquired {
            debug!(
                "Rate limiter: '{}' throttled, next token in {:?}",
                provider,
                bucket.wait_hint()
            );
        }
        acquired
    }

    /// Tokens currently available for a provider.
    pub fn remaining_tokens(&self, provider: &ProviderId) -> f64 {
        let limit = self.limit_for(provider);
        let mut buckets = self.lock_buckets();
        match buckets.get_mut(provider.as_ref()) {
            Some(bucket) => {
                bucket.refill();
                bucket.tokens
            }
            None => limit.burst_capacity.max(1.0),
        }
    }

    pub fn reset(&self, provider: &ProviderId) {
        self.lock_buckets().remove(provider.as_ref());
    }

    fn limit_for(&self, provider: &ProviderId) -> RateLimit {
        self.lock_limits()
            .get(provider.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
