use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;

use super::{CircuitBreaker, CircuitState, RateLimiter};
use crate::errors::{RetryClass, UpstreamError};
use crate::models::{ProviderId, UpstreamRequest, UpstreamResponse};
use crate::provider::{LiveFetcher, UpstreamProvider};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of the gateway for health reporting.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub provider: Option<String>,
    pub circuit: String,
    pub remaining_tokens: f64,
}

/// Live fetcher that guards a single upstream provider.
pub struct UpstreamGateway {
    provider: Option<Arc<dyn UpstreamProvider>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    timeout: Duration,
}

impl UpstreamGateway {
    pub fn new(provider: Arc<dyn UpstreamProvider>) -> Self {
        Self::with_parts(Some(provider), CircuitBreaker::new(), DEFAULT_TIMEOUT)
    }

    /// A gateway with no live provider: every fetch fails with
    /// [`UpstreamError::NotConfigured`], so callers always fall back.
    pub fn disconnected() -> Self {
        Self::with_parts(None, CircuitBreaker::new(), DEFAULT_TIMEOUT)
    }

    pub fn with_parts(
        provider: Option<Arc<dyn UpstreamProvider>>,
        circuit_breaker: CircuitBreaker,
        timeout: Duration,
    ) -> Self {
        let rate_limiter = RateLimiter::new();
        if let Some(provider) = &provider {
            let id: ProviderId = Cow::Borrowed(provider.id());
            rate_limiter.configure(&id, provider.rate_limit());
        }
        Self {
            provider,
            rate_limiter,
            circuit_breaker,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> GatewayStatus {
        match &self.provider {
            Some(provider) => {
                let id: ProviderId = Cow::Borrowed(provider.id());
                GatewayStatus {
                    provider: Some(provider.id().to_string()),
                    circuit: self.circuit_breaker.state(&id).to_string(),
                    remaining_tokens: self.rate_limiter.remaining_tokens(&id),
                }
            }
            None => GatewayStatus {
                provider: None,
                circuit: CircuitState::Open.to_string(),
                remaining_tokens: 0.0,
            },
        }
    }

    fn account_failure(&self, provider_id: &ProviderId, error: &UpstreamError) {
        match error.retry_class() {
            RetryClass::FailoverWithPenalty => {
                self.circuit_breaker.record_failure(provider_id);
                warn!(
                    "Upstream '{}' failed with {}, recorded circuit breaker failure",
                    provider_id, error
                );
            }
            RetryClass::Never | RetryClass::NextProvider | RetryClass::CircuitOpen => {
                info!("Upstream '{}' failed with {}", provider_id, error);
            }
        }
    }
}

#[async_trait]
impl LiveFetcher for UpstreamGateway {
    async fn fetch_live(
        &self,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let provider = self.provider.as_ref().ok_or(UpstreamError::NotConfigured)?;
        let provider_id: ProviderId = Cow::Borrowed(provider.id());

        if !self.circuit_breaker.is_allowed(&provider_id) {
            debug!("Circuit open for '{}', skipping live fetch", provider_id);
            return Err(UpstreamError::CircuitOpen {
                provider: provider_id.to_string(),
            });
        }

        if !self.rate_limiter.try_acquire(&provider_id) {
            return Err(UpstreamError::Throttled {
                provider: provider_id.to_string(),
            });
        }

        let outcome = match tokio::time::timeout(self.timeout, provider.fetch(request)).await {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(UpstreamError::Status {
                provider: provider_id.to_string(),
                status: response.status,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(UpstreamError::Timeout {
                provider: provider_id.to_string(),
            }),
        };

        match &outcome {
            Ok(_) => self.circuit_breaker.record_success(&provider_id),
            Err(e) => self.account_failure(&provider_id, e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CircuitBreakerConfig;
    use crate::provider::RateLimit;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays scripted outcomes, then answers 200.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<UpstreamResponse, UpstreamError>>>,
        delay: Duration,
        rate_limit: RateLimit,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<UpstreamResponse, UpstreamError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
                rate_limit: RateLimit::default(),
            }
        }
    }

    #[async_trait]
    impl UpstreamProvider for ScriptedProvider {
        fn id(&self) -> &'static str {
            "SCRIPTED"
        }

        fn rate_limit(&self) -> RateLimit {
            self.rate_limit.clone()
        }

        async fn fetch(
            &self,
            _request: &UpstreamRequest,
        ) -> Result<UpstreamResponse, UpstreamError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(UpstreamResponse::new(200, "{}")))
        }
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::new("character", "characters/zed")
    }

    fn provider_id() -> ProviderId {
        Cow::Borrowed("SCRIPTED")
    }

    #[tokio::test]
    async fn test_disconnected_gateway_fails_fast() {
        let gateway = UpstreamGateway::disconnected();
        let err = gateway.fetch_live(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured));
        assert!(gateway.status().provider.is_none());
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let provider = ScriptedProvider::new(vec![Ok(UpstreamResponse::new(200, "{\"name\":\"zed\"}"))]);
        let gateway = UpstreamGateway::new(Arc::new(provider));

        let response = gateway.fetch_live(&request()).await.unwrap();
        assert_eq!(response.body, "{\"name\":\"zed\"}");
        assert_eq!(gateway.status().circuit, "closed");
    }

    #[tokio::test]
    async fn test_non_success_response_is_an_error() {
        let provider = ScriptedProvider::new(vec![Ok(UpstreamResponse::new(503, "down"))]);
        let gateway = UpstreamGateway::new(Arc::new(provider));

        let err = gateway.fetch_live(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.delay = Duration::from_millis(200);
        let gateway = UpstreamGateway::with_parts(
            Some(Arc::new(provider)),
            CircuitBreaker::new(),
            Duration::from_millis(20),
        );

        let err = gateway.fetch_live(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_circuit() {
        let provider = ScriptedProvider::new(vec![
            Err(UpstreamError::RateLimited {
                provider: "SCRIPTED".into(),
            }),
            Err(UpstreamError::RateLimited {
                provider: "SCRIPTED".into(),
            }),
        ]);
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        let gateway =
            UpstreamGateway::with_parts(Some(Arc::new(provider)), breaker, Duration::from_secs(1));

        assert!(gateway.fetch_live(&request()).await.is_err());
        assert!(gateway.fetch_live(&request()).await.is_err());

        let err = gateway.fetch_live(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::CircuitOpen { .. }));
        assert_eq!(gateway.circuit_breaker.state(&provider_id()), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_client_error_does_not_penalize() {
        let provider = ScriptedProvider::new(vec![Err(UpstreamError::Status {
            provider: "SCRIPTED".into(),
            status: 404,
        })]);
        let gateway = UpstreamGateway::new(Arc::new(provider));

        assert!(gateway.fetch_live(&request()).await.is_err());
        assert_eq!(gateway.circuit_breaker.failure_count(&provider_id()), 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_throttled() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.rate_limit = RateLimit {
            requests_per_minute: 1,
            burst_capacity: 1.0,
        };
        let gateway = UpstreamGateway::new(Arc::new(provider));

        assert!(gateway.fetch_live(&request()).await.is_ok());
        let err = gateway.fetch_live(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Throttled { .. }));
    }
}
