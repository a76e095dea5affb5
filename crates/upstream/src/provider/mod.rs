//! Upstream provider abstractions and the HTTP implementation.
//!
//! - [`UpstreamProvider`]: a concrete data source (HTTP API, test double)
//! - [`LiveFetcher`]: what the cache arbiter calls for a live fetch; the
//!   [`UpstreamGateway`](crate::gateway::UpstreamGateway) implements it on top
//!   of a provider with rate limiting and circuit breaking
//! - [`RateLimit`]: per-provider request budget

mod capabilities;
mod traits;

pub mod http;

pub use capabilities::RateLimit;
pub use traits::{LiveFetcher, UpstreamProvider};
