//! LightRAG - HTTP client for knowledge buckets
//!
//! Each knowledge source is a bucket served by a LightRAG bucket server at
//! `POST {base}/api/buckets/{source}/query`. Sources can be routed to
//! different servers through per-source endpoints.

use crate::error::{Error, Result};
use crate::knowledge::KnowledgeSource;
use crate::util::sanitize_api_error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default bucket server URL
const DEFAULT_BASE_URL: &str = "http://localhost:8001";

#[derive(Debug, Serialize)]
struct BucketQueryRequest<'a> {
    question: &'a str,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct BucketQueryResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// LightRAG client configuration
#[derive(Debug, Clone)]
pub struct LightRagConfig {
    /// Server used for sources without a dedicated endpoint
    pub base_url: String,
    /// Per-source server overrides
    pub endpoints: BTreeMap<String, String>,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for LightRagConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: BTreeMap::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl LightRagConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Route one source to its own server
    #[must_use]
    pub fn with_endpoint(mut self, source: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(source.into(), url.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query URL for a source
    pub fn query_url(&self, source: &str) -> Result<String> {
        let base = self
            .endpoints
            .get(source)
            .map(String::as_str)
            .unwrap_or(self.base_url.as_str());
        if base.trim().is_empty() {
            return Err(Error::UnknownSource(source.to_string()));
        }
        Ok(format!(
            "{}/api/buckets/{}/query",
            base.trim_end_matches('/'),
            source
        ))
    }
}

/// LightRAG bucket client
pub struct LightRagClient {
    client: Client,
    config: LightRagConfig,
}

impl LightRagClient {
    /// Create a new client
    pub fn new(config: LightRagConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &LightRagConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for LightRagClient {
    fn name(&self) -> &str {
        "lightrag"
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn query(&self, source: &str, prompt: &str, mode: &str) -> Result<String> {
        let url = self.config.query_url(source)?;
        debug!("Querying bucket {} at {}", source, url);

        let response = self
            .client
            .post(&url)
            .json(&BucketQueryRequest {
                question: prompt,
                mode,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.config.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    Error::Network(format!("failed to connect to bucket server for {source}"))
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(Error::RateLimit);
        }

        let parsed: Option<BucketQueryResponse> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let detail = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::Api(sanitize_api_error(&detail)));
        }

        let parsed = parsed
            .ok_or_else(|| Error::InvalidResponse(format!("unparseable bucket response from {source}")))?;
        if let Some(error) = parsed.error {
            return Err(Error::Api(sanitize_api_error(&error)));
        }
        parsed
            .response
            .ok_or_else(|| Error::InvalidResponse(format!("bucket {source} returned no response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_routing() {
        let config = LightRagConfig::new()
            .with_base_url("http://rag:8001/")
            .with_endpoint("plays", "http://theatre:9000");

        assert_eq!(
            config.query_url("scripts").unwrap(),
            "http://rag:8001/api/buckets/scripts/query"
        );
        assert_eq!(
            config.query_url("plays").unwrap(),
            "http://theatre:9000/api/buckets/plays/query"
        );
    }

    #[test]
    fn test_query_url_without_server() {
        let config = LightRagConfig::new().with_base_url("");
        assert!(matches!(
            config.query_url("scripts"),
            Err(Error::UnknownSource(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(BucketQueryRequest {
            question: "What makes a meet-cute work?",
            mode: "hybrid",
        })
        .unwrap();
        assert_eq!(body["question"], "What makes a meet-cute work?");
        assert_eq!(body["mode"], "hybrid");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let client = LightRagClient::new(
            LightRagConfig::new()
                .with_base_url("http://127.0.0.1:9")
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        let err = client.query("scripts", "hello", "hybrid").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
