//! `reqwest` adapter for the ingestion client.
//!
//! Implements the [`ingest::Transport`] port over a [`reqwest::Client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** TLS, connection pooling, timeouts and redirect policy
//! live here. The [`ingest`] crate sees only [`ingest::Transport`].
//!
//! Redirects are not followed: the ingestion protocol reports locations in
//! headers (`Location` on token issuance) that the client must see verbatim.

use std::time::Duration;

use async_trait::async_trait;
use ingest::{HttpRequest, HttpResponse, Transport, TransportError, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Whole-request timeout in milliseconds. `None` waits indefinitely and
    /// leaves deadlines to the caller's cancellation token.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// TCP/TLS connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Fallback `User-Agent` for requests that do not set one.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` / `NO_PROXY` from the environment.
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
            use_system_proxy: default_use_system_proxy(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_use_system_proxy() -> bool {
    true
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with [`TransportConfig::default`].
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(&TransportConfig::default())
    }

    /// Builds a transport from `config`.
    pub fn with_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone());
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::with_source("failed to build HTTP client", e))?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_error)?.to_vec();
        debug!(status = status.as_u16(), bytes = body.len(), "http response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    let message = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_body() || error.is_decode() {
        "failed to read response body"
    } else {
        "request failed"
    };
    let timed_out = error.is_timeout();
    let mapped = TransportError::with_source(message, error);
    if timed_out {
        mapped.timed_out()
    } else {
        mapped
    }
}
