//! Request and response types exchanged with the upstream provider.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provider identifier (e.g., "GAME_API", "MOCK").
pub type ProviderId = Cow<'static, str>;

/// Response headers, ordered by name so serialized entries are stable.
pub type Headers = BTreeMap<String, String>;

/// A single upstream operation call.
///
/// Parameters live in a `BTreeMap` so iteration order is the sorted order,
/// which makes [`UpstreamRequest::normalized_params`] independent of how the
/// caller assembled them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequest {
    /// Operation kind, e.g. "character", "party", "recommendation".
    pub operation: String,
    /// Provider endpoint path relative to the base URL.
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl UpstreamRequest {
    pub fn new(operation: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Percent-encoded `name=value` pairs sorted by name and joined with `&`.
    pub fn normalized_params(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name.trim()),
                    urlencoding::encode(value.trim())
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Endpoint with leading and trailing slashes removed.
    pub fn trimmed_endpoint(&self) -> &str {
        self.endpoint.trim_matches('/')
    }
}

/// What the provider (or the mock source) answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
    #[serde(default)]
    pub headers: Headers,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
