//! Value types exchanged with the ingestion service.
//!
//! Unlike the identifiers in [`crate::identifiers`], these carry payloads:
//! service responses ([`AppProfile`], [`ArtifactAccepted`]), the upload
//! location handed out for the out-of-band blob write ([`UploadToken`]), and
//! the lease vocabulary ([`Lease`], [`LeaseDuration`], [`LeaseMetadata`]).
//!
//! Response records accept camelCase JSON and tolerate PascalCase through
//! aliases; fields the client does not model are kept in `additional`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArtifactId, LeaseId, LeaseNamespace};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Service-reported UTC instant, such as `acceptedTime` on a commit.
///
/// RFC 3339 on the wire; offsets are normalized to UTC on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Service responses
// ---------------------------------------------------------------------------

/// Per-instrumentation-key profile record returned by the profile lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProfile {
    /// Application resource identifier.
    #[serde(default, alias = "AppId", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<Uuid>,

    /// Service stamp (deployment unit) serving this application.
    #[serde(default, alias = "StampId", skip_serializing_if = "Option::is_none")]
    pub stamp_id: Option<String>,

    /// Instrumentation key echoed back by the service.
    #[serde(
        default,
        rename = "iKey",
        alias = "IKey",
        alias = "ikey",
        skip_serializing_if = "Option::is_none"
    )]
    pub ikey: Option<String>,

    /// Fields this client does not model.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Confirmation that the service accepted a committed artifact.
///
/// Terminal success marker for one artifact's lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAccepted {
    /// Artifact the confirmation refers to.
    #[serde(default, alias = "ArtifactId", skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,

    /// Service stamp that accepted the artifact.
    #[serde(default, alias = "StampId", skip_serializing_if = "Option::is_none")]
    pub stamp_id: Option<String>,

    /// When the service accepted the artifact.
    #[serde(default, alias = "AcceptedTime", skip_serializing_if = "Option::is_none")]
    pub accepted_time: Option<Timestamp>,

    /// Fields this client does not model.
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Structured error detail extracted from a failed response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    /// Machine-readable service error code.
    #[serde(default, alias = "Code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable service error message.
    #[serde(default, alias = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceError {
    /// Returns `true` when neither a code nor a message is present.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none()
    }
}

// ---------------------------------------------------------------------------
// Upload token
// ---------------------------------------------------------------------------

/// Write-capable blob location handed out by the service.
///
/// The URI embeds a time-limited credential, so [`std::fmt::Debug`] omits the
/// query string. [`UploadToken::location`] is the header text exactly as the
/// service sent it; [`UploadToken::blob_uri`] is the parsed form, which `url`
/// normalizes (an empty path becomes `/`, default ports are dropped).
#[derive(Clone, PartialEq, Eq)]
pub struct UploadToken {
    location: String,
    blob_uri: Url,
}

impl UploadToken {
    /// Wraps a blob URI built by the caller.
    pub fn new(blob_uri: Url) -> Self {
        Self {
            location: blob_uri.as_str().to_string(),
            blob_uri,
        }
    }

    /// Parses a `Location` header value, keeping the original text.
    pub fn from_location(
        location: impl Into<String>,
    ) -> Result<Self, <Url as std::str::FromStr>::Err> {
        let location = location.into();
        let blob_uri = Url::parse(&location)?;
        Ok(Self { location, blob_uri })
    }

    /// The `Location` value as sent, including the write credential.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Full blob URI, including the write credential.
    pub fn blob_uri(&self) -> &Url {
        &self.blob_uri
    }

    /// Consumes the token, returning the URI.
    pub fn into_blob_uri(self) -> Url {
        self.blob_uri
    }
}

impl std::fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut redacted = self.blob_uri.clone();
        redacted.set_query(None);
        f.debug_struct("UploadToken")
            .field("blob_uri", &redacted.as_str())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

/// Requested lease lifetime, in whole seconds.
///
/// The service accepts [`LeaseDuration::MIN`] to [`LeaseDuration::MAX`]. The
/// client forwards whatever it is given; out-of-range values are rejected by
/// the service, not clamped here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeaseDuration(u32);

impl LeaseDuration {
    /// Shortest lease the service grants.
    pub const MIN: Self = Self(15);
    /// Longest lease the service grants.
    pub const MAX: Self = Self(60);

    /// Creates a duration of `seconds`.
    pub fn from_secs(seconds: u32) -> Self {
        Self(seconds)
    }

    /// Creates a duration from a [`Duration`], truncating sub-second parts and
    /// saturating at `u32::MAX` seconds.
    pub fn from_duration(duration: Duration) -> Self {
        Self(u32::try_from(duration.as_secs()).unwrap_or(u32::MAX))
    }

    /// Number of whole seconds.
    pub fn as_secs(self) -> u32 {
        self.0
    }

    /// As a [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }

    /// Whether the service is expected to accept this duration.
    pub fn is_within_service_bounds(self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self)
    }
}

impl Default for LeaseDuration {
    fn default() -> Self {
        Self(30)
    }
}

impl From<Duration> for LeaseDuration {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

impl std::fmt::Display for LeaseDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Free-form diagnostic key/value pairs attached to a lease acquisition.
///
/// Sent as the JSON request body; never interpreted by the client.
pub type LeaseMetadata = BTreeMap<String, String>;

/// A lease granted by the service.
///
/// This is a plain record, not an owning handle: nothing happens when it is
/// dropped. Renewal and release are explicit calls carrying [`Lease::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Capability token proving ownership.
    pub id: LeaseId,
    /// Namespace the lease was granted in.
    pub namespace: LeaseNamespace,
    /// Duration requested at acquisition.
    pub duration: LeaseDuration,
}
