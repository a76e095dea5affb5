//! Error types and retry classification for upstream calls.
//!
//! - [`UpstreamError`]: every way a live fetch or mock synthesis can fail
//! - [`RetryClass`]: how the gateway should account for the failure

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors raised while talking to the upstream data provider or while
/// synthesizing a mock substitute.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// No live provider is configured for this deployment.
    #[error("Upstream provider not configured")]
    NotConfigured,

    /// The local token bucket for this provider is empty.
    /// The call was not sent.
    #[error("Throttled locally: {provider}")]
    Throttled {
        /// The provider whose budget is exhausted
        provider: String,
    },

    /// The provider answered HTTP 429.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider answered with a non-2xx status other than 429.
    #[error("Unexpected status {status} from {provider}")]
    Status {
        /// The provider that answered
        provider: String,
        /// HTTP status code
        status: u16,
    },

    /// The provider's circuit breaker is open.
    #[error("Circuit open: {provider}")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
    },

    /// The response could not be read.
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// No mock fixture exists for the endpoint and placeholder synthesis is off.
    #[error("No mock available for endpoint: {endpoint}")]
    MockUnavailable { endpoint: String },

    /// A fixture file could not be loaded.
    #[error("Failed to load mock fixture: {0}")]
    Fixture(String),

    /// A network error occurred while communicating with the provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use rosterhub_upstream::errors::{RetryClass, UpstreamError};
    ///
    /// let error = UpstreamError::Timeout { provider: "GAME_API".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = UpstreamError::Status { provider: "GAME_API".to_string(), status: 404 };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Status { status, .. } if *status >= 500 => RetryClass::FailoverWithPenalty,
            Self::Status { .. }
            | Self::MockUnavailable { .. }
            | Self::Fixture(_)
            | Self::InvalidResponse { .. } => RetryClass::Never,

            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network(_) => {
                RetryClass::FailoverWithPenalty
            }

            Self::Throttled { .. } | Self::NotConfigured => RetryClass::NextProvider,

            Self::CircuitOpen { .. } => RetryClass::CircuitOpen,
        }
    }
}
