//! Origin Transport
//!
//! The network primitive the cache fetches through.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use crate::error::{CacheError, Result};

// == Origin Response ==
/// Status, content type and raw body of an origin response.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginResponse {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase for the status
    pub reason: String,
    /// Content-Type header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl OriginResponse {
    /// Creates a `200 OK` response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            content_type: None,
            body: body.into(),
        }
    }

    /// Creates an empty response with the given status.
    pub fn with_status(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == Transport ==
/// Fetches endpoints from the origin.
///
/// Implementations report unreachable origins as [`CacheError::Network`] and
/// return every answered request as an [`OriginResponse`], whatever its status.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a GET for `endpoint` relative to the origin.
    async fn get(&self, endpoint: &str) -> Result<OriginResponse>;
}

// == HTTP Transport ==
/// [`Transport`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the origin at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("origin_cache/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Absolute URL for `endpoint`.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, endpoint: &str) -> Result<OriginResponse> {
        let url = self.url_for(endpoint);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError::Network(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::Network(e.to_string()))?;

        Ok(OriginResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            body: body.to_vec(),
        })
    }
}
