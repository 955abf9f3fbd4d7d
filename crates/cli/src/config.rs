//! Environment-driven configuration for `diagctl`.
//!
//! Every setting comes from an `INGEST_*` variable. Lookup goes through a
//! closure so tests can supply a fixed map instead of the process environment.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use http_transport::TransportConfig;
use ingest::{ClientOptions, InstrumentationKey, LeaseDuration, LeaseNamespace, RenewalRetry};

/// Everything `diagctl` needs to run.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub client: ClientOptions,
    pub transport: TransportConfig,
    pub ikey: InstrumentationKey,
    pub namespace: LeaseNamespace,
    pub lease_duration: LeaseDuration,
    pub log_json: bool,
}

impl CliConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = get("INGEST_ENDPOINT").ok_or_else(|| anyhow!("INGEST_ENDPOINT is not set"))?;
        let mut client = ClientOptions::from_endpoint(&endpoint).context("INGEST_ENDPOINT")?;
        if let Some(version) = get("INGEST_API_VERSION") {
            client = client.with_api_version(version);
        }
        if let Some(agent) = get("INGEST_USER_AGENT") {
            client = client.with_user_agent(agent);
        }

        let mut retry = RenewalRetry::disabled();
        if let Some(raw) = get("INGEST_RENEWAL_RETRIES") {
            retry.max_retries = raw.parse().context("INGEST_RENEWAL_RETRIES")?;
        }
        if let Some(raw) = get("INGEST_RENEWAL_RETRY_DELAY_MS") {
            retry.delay_ms = raw.parse().context("INGEST_RENEWAL_RETRY_DELAY_MS")?;
        }
        client = client.with_renewal_retry(retry);

        let mut transport = TransportConfig::default();
        if let Some(raw) = get("INGEST_TIMEOUT_MS") {
            transport.timeout_ms = Some(raw.parse().context("INGEST_TIMEOUT_MS")?);
        }

        let ikey = InstrumentationKey::new(get("INGEST_IKEY").unwrap_or_default())
            .context("INGEST_IKEY")?;
        let namespace = LeaseNamespace::new(
            get("INGEST_LEASE_NAMESPACE").unwrap_or_else(|| "diagnostics".to_string()),
        )
        .context("INGEST_LEASE_NAMESPACE")?;
        let lease_duration = match get("INGEST_LEASE_DURATION_SECS") {
            Some(raw) => LeaseDuration::from_secs(raw.parse().context("INGEST_LEASE_DURATION_SECS")?),
            None => LeaseDuration::default(),
        };

        Ok(Self {
            client,
            transport,
            ikey,
            namespace,
            lease_duration,
            log_json: get("INGEST_LOG_JSON").is_some(),
        })
    }

    /// How long to wait before renewing: half the lease duration.
    pub fn renew_after(&self) -> Duration {
        self.lease_duration.as_duration() / 2
    }
}
