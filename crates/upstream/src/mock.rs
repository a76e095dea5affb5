//! Mock substitute responses.
//!
//! When the live provider is unavailable or throttled, the cache arbiter asks
//! a [`MockSource`] for a stand-in. [`FixtureMockSource`] answers from
//! registered fixtures and, optionally, a deterministic placeholder for
//! endpoints it has no fixture for.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info};
use serde_json::json;

use crate::errors::UpstreamError;
use crate::models::{UpstreamRequest, UpstreamResponse};

/// Header marking a response as synthesized.
pub const MOCK_HEADER: &str = "x-rosterhub-mock";

/// Synthesizes substitute responses.
pub trait MockSource: Send + Sync {
    fn synthesize(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// Fixture-backed mock source.
///
/// Fixtures are keyed by trimmed endpoint (`characters/zed`). On disk, a
/// fixture file is named after its endpoint with `/` replaced by `__`
/// (`characters__zed.json`).
#[derive(Clone, Debug, Default)]
pub struct FixtureMockSource {
    fixtures: HashMap<String, String>,
    placeholders: bool,
}

impl FixtureMockSource {
    /// A source that only answers from fixtures.
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that falls back to a generated placeholder body.
    pub fn with_placeholders() -> Self {
        Self {
            fixtures: HashMap::new(),
            placeholders: true,
        }
    }

    pub fn with_fixture(mut self, endpoint: &str, body: impl Into<String>) -> Self {
        self.fixtures
            .insert(endpoint.trim_matches('/').to_string(), body.into());
        self
    }

    /// Load every `*.json` file in `dir` as a fixture.
    ///
    /// Returns the number of fixtures loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, UpstreamError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| UpstreamError::Fixture(format!("{}: {}", dir.display(), e)))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| UpstreamError::Fixture(e.to_string()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = fs::read_to_string(&path)
                .map_err(|e| UpstreamError::Fixture(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str::<serde_json::Value>(&body)
                .map_err(|e| UpstreamError::Fixture(format!("{}: {}", path.display(), e)))?;

            self.fixtures.insert(stem.replace("__", "/"), body);
            loaded += 1;
        }

        info!("Loaded {} mock fixtures from {}", loaded, dir.display());
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    fn placeholder(request: &UpstreamRequest) -> String {
        json!({
            "mock": true,
            "operation": request.operation,
            "endpoint": request.trimmed_endpoint(),
            "params": request.params,
            "generatedAt": Utc::now().to_rfc3339(),
        })
        .to_string()
    }
}

impl MockSource for FixtureMockSource {
    fn synthesize(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let endpoint = request.trimmed_endpoint();

        let (body, origin) = match self.fixtures.get(endpoint) {
            Some(body) => (body.clone(), "fixture"),
            None if self.placeholders => (Self::placeholder(request), "placeholder"),
            None => {
                return Err(UpstreamError::MockUnavailable {
                    endpoint: endpoint.to_string(),
                })
            }
        };

        debug!("Synthesized mock response for '{}' from {}", endpoint, origin);
        Ok(UpstreamResponse::new(200, body)
            .with_header("content-type", "application/json")
            .with_header(MOCK_HEADER, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_wins_over_placeholder() {
        let source = FixtureMockSource::with_placeholders()
            .with_fixture("/characters/zed/", "{\"name\":\"zed\"}");
        let request = UpstreamRequest::new("character", "characters/zed");

        let response = source.synthesize(&request).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"name\":\"zed\"}");
        assert_eq!(response.headers.get(MOCK_HEADER).map(String::as_str), Some("fixture"));
    }

    #[test]
    fn test_placeholder_describes_request() {
        let source = FixtureMockSource::with_placeholders();
        let request = UpstreamRequest::new("party", "parties/7").with_param("size", "4");

        let response = source.synthesize(&request).unwrap();
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["mock"], true);
        assert_eq!(body["endpoint"], "parties/7");
        assert_eq!(body["params"]["size"], "4");
    }

    #[test]
    fn test_unknown_endpoint_without_placeholders_fails() {
        let source = FixtureMockSource::new();
        let request = UpstreamRequest::new("character", "characters/unknown");

        let err = source.synthesize(&request).unwrap_err();
        assert!(matches!(err, UpstreamError::MockUnavailable { .. }));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("characters__zed.json"), "{\"level\":60}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = FixtureMockSource::new();
        assert_eq!(source.load_dir(dir.path()).unwrap(), 1);

        let response = source
            .synthesize(&UpstreamRequest::new("character", "characters/zed"))
            .unwrap();
        assert_eq!(response.body, "{\"level\":60}");
    }

    #[test]
    fn test_load_dir_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let mut source = FixtureMockSource::new();
        assert!(matches!(
            source.load_dir(dir.path()),
            Err(UpstreamError::Fixture(_))
        ));
    }
}
