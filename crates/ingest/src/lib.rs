//! Client for a diagnostic-artifact ingestion service.
//!
//! Uploads opaque diagnostic artifacts (dumps, traces, logs) through a
//! token → out-of-band blob write → conditional commit sequence, and
//! coordinates concurrency across clients with server-issued leases so that
//! at most N uploads run per namespace.
//!
//! ## Architectural Layer
//!
//! **Protocol orchestration + port definitions.** This crate performs no I/O of
//! its own. Every request goes through the [`Transport`] port; the
//! `http-transport` crate supplies the `reqwest` implementation.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`InstrumentationKey`, `ArtifactId`, `LeaseId`, etc.) |
//! | [`types`] | Service records and lease value types |
//! | [`errors`] | [`DiagnosticsError`] taxonomy and [`RetryPolicy`] |
//! | [`options`] | [`ClientOptions`] and [`RenewalRetry`] |
//! | [`transport`] | The [`Transport`] port and its request/response types |
//! | [`request`] | Request construction for each protocol operation |
//! | [`client`] | [`DiagnosticsClient`], the public orchestrator |
//!
//! ## Example
//!
//! ```no_run
//! # async fn run<T: ingest::Transport>(transport: T) -> Result<(), ingest::DiagnosticsError> {
//! use ingest::{ClientOptions, DiagnosticsClient, DiagnosticsError, InstrumentationKey,
//!     LeaseDuration, LeaseNamespace};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = DiagnosticsClient::new(
//!     transport,
//!     ClientOptions::from_endpoint("https://ingest.example.com/")?,
//! )?;
//! let ikey = InstrumentationKey::new("my-ikey")?;
//! let namespace = LeaseNamespace::new("uploads")?;
//! let cancel = CancellationToken::new();
//!
//! match client
//!     .acquire_lease(&ikey, &namespace, LeaseDuration::from_secs(30), None, &cancel)
//!     .await
//! {
//!     Ok(lease) => {
//!         // ... upload, renewing before 30s elapse ...
//!         client.release_lease(&ikey, &namespace, lease.id, &cancel).await?;
//!     }
//!     Err(DiagnosticsError::LeaseUnavailable { .. }) => {
//!         // At capacity: back off and try later.
//!     }
//!     Err(other) => return Err(other),
//! }
//! # Ok(())
//! # }
//! ```

mod classify;

pub mod client;
pub mod errors;
pub mod identifiers;
pub mod options;
pub mod request;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use client::DiagnosticsClient;
pub use errors::{DiagnosticsError, RetryPolicy};
pub use identifiers::{ArtifactId, ArtifactKind, ETag, InstrumentationKey, LeaseId, LeaseNamespace};
pub use options::{ClientOptions, RenewalRetry, DEFAULT_USER_AGENT};
pub use request::LeaseAction;
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};
pub use types::{
    AppProfile, ArtifactAccepted, Lease, LeaseDuration, LeaseMetadata, ServiceError, Timestamp,
    UploadToken,
};

// Callers need these to build and inspect transports without a direct reqwest
// dependency.
pub use reqwest::{header, Method, StatusCode, Url};
pub use tokio_util::sync::CancellationToken;
