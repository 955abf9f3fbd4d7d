//! Client configuration.
//!
//! [`ClientOptions`] is plain data with serde support so the composition root
//! can load it however it likes (the `cli` crate reads environment variables).

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::DiagnosticsError;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("ingest/", env!("CARGO_PKG_VERSION"));

/// Settings for a [`crate::DiagnosticsClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Base URL of the ingestion service. A path prefix is kept.
    #[serde(with = "url_string")]
    pub endpoint: Url,

    /// Sent as the `api-version` query parameter when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transient-failure retries applied to lease renewal only.
    #[serde(default)]
    pub renewal_retry: RenewalRetry,
}

impl ClientOptions {
    /// Options for `endpoint` with every other setting at its default.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            api_version: None,
            user_agent: default_user_agent(),
            renewal_retry: RenewalRetry::default(),
        }
    }

    /// Parses `endpoint` and returns default options for it.
    pub fn from_endpoint(endpoint: &str) -> Result<Self, DiagnosticsError> {
        let url = Url::parse(endpoint)
            .map_err(|e| DiagnosticsError::invalid_argument("endpoint", e.to_string()))?;
        Self::new(url).validated()
    }

    /// Sets the `api-version` query parameter.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Overrides the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the renewal retry policy.
    pub fn with_renewal_retry(mut self, renewal_retry: RenewalRetry) -> Self {
        self.renewal_retry = renewal_retry;
        self
    }

    /// Checks that the endpoint can carry path segments.
    ///
    /// Rejects URLs such as `mailto:` or `data:` that have no hierarchical path.
    pub fn validated(self) -> Result<Self, DiagnosticsError> {
        if self.endpoint.cannot_be_a_base() {
            return Err(DiagnosticsError::invalid_argument(
                "endpoint",
                format!("'{}' cannot be used as a base URL", self.endpoint),
            ));
        }
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(DiagnosticsError::invalid_argument(
                "endpoint",
                format!("unsupported scheme '{}'", self.endpoint.scheme()),
            ));
        }
        Ok(self)
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Whether `renew_lease` re-sends after transient failures.
///
/// A missed renewal can silently drop a held lease, so this is an explicit
/// setting. The default (`max_retries: 0`) leaves renewal retry entirely to
/// the caller. When enabled, only transport errors and 408/429/5xx responses
/// are retried; a conflict is never retried because it means the lease is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalRetry {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Fixed pause between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RenewalRetry {
    /// No retries.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Up to `max_retries` extra attempts, `delay` apart.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Pause between attempts.
    pub fn delay(self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RenewalRetry {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 1_000,
        }
    }
}

mod url_string {
    use reqwest::Url;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(url.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Url, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Url::parse(&raw).map_err(serde::de::Error::custom)
    }
}
