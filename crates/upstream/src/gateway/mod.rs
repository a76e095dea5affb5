//! Gateway around the live provider.
//!
//! Every live call passes, in order, through:
//! - the circuit breaker (skip a provider that keeps failing)
//! - the rate limiter (refuse instead of waiting when the budget is spent)
//! - a per-call timeout
//!
//! Refusals surface as errors so the cache arbiter can fall back immediately.

mod circuit_breaker;
mod gateway;
mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use gateway::{GatewayStatus, UpstreamGateway};
pub use rate_limiter::RateLimiter;
