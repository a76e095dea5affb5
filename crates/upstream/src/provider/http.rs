//! HTTP upstream provider.
//!
//! Issues `GET {base_url}/{endpoint}?{params}` with an optional bearer token
//! and maps transport and status failures onto [`UpstreamError`].

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

use crate::errors::UpstreamError;
use crate::models::{Headers, UpstreamRequest, UpstreamResponse};
use crate::provider::{RateLimit, UpstreamProvider};

const PROVIDER_ID: &str = "GAME_API";

/// Response headers worth keeping in the cache.
const FORWARDED_HEADERS: &[&str] = &[
    "content-type",
    "etag",
    "last-modified",
    "cache-control",
    "x-ratelimit-remaining",
];

/// Live provider backed by `reqwest`.
pub struct HttpProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limit: RateLimit,
}

impl HttpProvider {
    /// Create a provider for `base_url`.
    ///
    /// `timeout` is a transport-level ceiling; the gateway applies its own
    /// (usually shorter) per-call deadline on top.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            rate_limit: RateLimit::default(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    fn url_for(&self, request: &UpstreamRequest) -> String {
        format!("{}/{}", self.base_url, request.trimmed_endpoint())
    }
}

#[async_trait]
impl UpstreamProvider for HttpProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(request);
        let mut builder = self.client.get(&url);

        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        debug!(
            "Upstream request: {} ({}) with {} params",
            request.endpoint,
            request.operation,
            request.params.len()
        );

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                UpstreamError::Network(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                provider: PROVIDER_ID.to_string(),
                status: status.as_u16(),
            });
        }

        let mut headers = Headers::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = response.headers().get(*name) {
                if let Ok(value) = value.to_str() {
                    headers.insert((*name).to_string(), value.to_string());
                }
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::InvalidResponse {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to read response: {}", e),
            })?;

        Ok(UpstreamResponse {
            status: status.as_u16(),
            body,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_duplicate_slashes() {
        let provider = HttpProvider::new("https://api.example.test/v2/", None, Duration::from_secs(5));
        let request = UpstreamRequest::new("character", "/characters/zed");

        assert_eq!(
            provider.url_for(&request),
            "https://api.example.test/v2/characters/zed"
        );
    }

    #[test]
    fn test_custom_rate_limit() {
        let provider = HttpProvider::new("https://api.example.test", None, Duration::from_secs(5))
            .with_rate_limit(RateLimit {
                requests_per_minute: 20,
                burst_capacity: 2.0,
            });

        assert_eq!(provider.rate_limit().requests_per_minute, 20);
        assert_eq!(provider.id(), "GAME_API");
    }
}
