//! Upstream HTTP transport.
//!
//! The fetcher never talks to `reqwest` directly: it asks a [`TransportFactory`]
//! for a [`ConfigTransport`] on every pull, so tests can swap in a fake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised below the fetch protocol.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset, timed out, or similar.
    #[error("request failed: {0}")]
    Request(String),

    /// The factory could not produce a usable client.
    #[error("invalid http client: {0}")]
    InvalidClient(String),
}

/// What the fetcher needs from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl TransportResponse {
    /// Whether the declared content type is JSON.
    pub fn is_json(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("application/json")
    }
}

/// A request-capable HTTP client.
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
        headers: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// Produces a transport for each pull.
pub type TransportFactory =
    Arc<dyn Fn() -> Result<Arc<dyn ConfigTransport>, TransportError> + Send + Sync>;

/// Factory that always hands out the same transport.
pub fn shared_factory(transport: Arc<dyn ConfigTransport>) -> TransportFactory {
    Arc::new(move || Ok(transport.clone()))
}

/// Production transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::InvalidClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// Factory sharing one pooled client across all pulls.
    pub fn factory(timeout: Duration) -> Result<TransportFactory, TransportError> {
        let transport: Arc<dyn ConfigTransport> = Arc::new(Self::new(timeout)?);
        Ok(shared_factory(transport))
    }
}

#[async_trait]
impl ConfigTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
        headers: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}
