//! Rosterhub Upstream Crate
//!
//! Everything that talks to (or stands in for) the rate-limited upstream
//! game-data provider.
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  Cache arbiter   | --> |   LiveFetcher    |  (trait)
//! +------------------+     +------------------+
//!          |                        |
//!          |                        v
//!          |               +------------------+
//!          |               | UpstreamGateway  |  (breaker, limiter, timeout)
//!          |               +------------------+
//!          |                        |
//!          |                        v
//!          |               +------------------+
//!          |               | UpstreamProvider |  (HttpProvider)
//!          |               +------------------+
//!          v
//! +------------------+
//! |    MockSource    |  (fixtures / placeholders)
//! +------------------+
//! ```

pub mod errors;
pub mod gateway;
pub mod mock;
pub mod models;
pub mod provider;

pub use errors::{RetryClass, UpstreamError};
pub use gateway::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, GatewayStatus, RateLimiter,
    UpstreamGateway,
};
pub use mock::{FixtureMockSource, MockSource, MOCK_HEADER};
pub use models::{Headers, ProviderId, UpstreamRequest, UpstreamResponse};
pub use provider::http::HttpProvider;
pub use provider::{LiveFetcher, RateLimit, UpstreamProvider};
