//! `diagctl`: ingestion client entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Load configuration** from `INGEST_*` environment variables (see
//!    [`config::CliConfig`]). There is no argument parsing.
//! 2. **Wire observability**: `tracing-subscriber` with an `EnvFilter`
//!    (`RUST_LOG`, default `info`) and a JSON formatter when `INGEST_LOG_JSON`
//!    is set. All spans and events from `ingest` and `http-transport` flow
//!    through it.
//! 3. **Construct infrastructure**: a [`ReqwestTransport`] injected into a
//!    [`DiagnosticsClient`].
//! 4. **Smoke-run the protocol**: resolve the profile, take a lease, renew it
//!    once at half its duration, and release it.
//!
//! Exit codes: `0` success, `1` failure, `2` configuration error,
//! `3` lease namespace at capacity, `4` lease lost before renewal,
//! `130` interrupted.

mod config;

use std::process::ExitCode;

use anyhow::Result;
use http_transport::ReqwestTransport;
use ingest::{CancellationToken, DiagnosticsClient, DiagnosticsError, LeaseMetadata};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("diagctl: {e:#}");
            return ExitCode::from(2);
        }
    };
    init_tracing(config.log_json);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match run(&config, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(failure_code(&e, &config)),
    }
}

/// Marks a renewal refused because the lease is no longer ours.
#[derive(Debug)]
struct LeaseLost;

impl std::fmt::Display for LeaseLost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("lease lost before renewal")
    }
}

fn failure_code(e: &anyhow::Error, config: &CliConfig) -> u8 {
    if e.downcast_ref::<LeaseLost>().is_some() {
        warn!(namespace = %config.namespace, error = %format!("{e:#}"), "lease lost before renewal");
        return 4;
    }
    match e.downcast_ref::<DiagnosticsError>() {
        Some(err) if err.is_lease_unavailable() => {
            info!(namespace = %config.namespace, "lease namespace at capacity, try again later");
            3
        }
        Some(err) if err.is_cancelled() => 130,
        _ => {
            error!(error = %format!("{e:#}"), "diagctl failed");
            1
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: &CliConfig, cancel: &CancellationToken) -> Result<()> {
    let transport = ReqwestTransport::with_config(&config.transport)?;
    let client = DiagnosticsClient::new(transport, config.client.clone())?;

    let profile = client.get_profile(&config.ikey, cancel).await?;
    info!(app_id = ?profile.app_id, stamp_id = ?profile.stamp_id, "profile resolved");

    if !config.lease_duration.is_within_service_bounds() {
        warn!(duration = %config.lease_duration, "lease duration is outside 15s..60s; the service will likely reject it");
    }
    let metadata = LeaseMetadata::from([
        ("tool".to_string(), "diagctl".to_string()),
        ("pid".to_string(), std::process::id().to_string()),
    ]);
    let lease = client
        .acquire_lease(
            &config.ikey,
            &config.namespace,
            config.lease_duration,
            Some(&metadata),
            cancel,
        )
        .await?;

    let renewed = tokio::select! {
        _ = cancel.cancelled() => Err(DiagnosticsError::Cancelled),
        _ = tokio::time::sleep(config.renew_after()) => {
            client.renew_lease(&config.ikey, &config.namespace, lease.id, cancel).await
        }
    };

    // Release even after an interrupt so the slot frees up before expiry.
    let released = client
        .release_lease(
            &config.ikey,
            &config.namespace,
            lease.id,
            &CancellationToken::new(),
        )
        .await;

    check_renewal(renewed)?;
    released?;
    Ok(())
}

/// A 409 on renewal means the lease expired or was taken, not that the
/// namespace is full.
fn check_renewal(renewed: Result<(), DiagnosticsError>) -> Result<()> {
    match renewed {
        Err(err) if err.is_lease_unavailable() => Err(anyhow::Error::new(err).context(LeaseLost)),
        other => Ok(other?),
    }
}
