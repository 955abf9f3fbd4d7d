//! Newtype identifiers for the ingestion protocol.
//!
//! Every value that addresses a resource on the service is a distinct newtype.
//! This keeps an [`InstrumentationKey`] from being passed where a
//! [`LeaseNamespace`] is expected, and makes the "non-blank" rule a property of
//! the type rather than a check repeated in every operation: a value that
//! exists has already been validated, including values that came from serde.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DiagnosticsError;

// ---------------------------------------------------------------------------
// Macro for non-blank String-wrapped newtypes.
// Generates: struct, new() returning Result<Self, DiagnosticsError>, as_str(),
// Display, TryFrom<String>/TryFrom<&str>, and validating Deserialize.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident, $arg:literal
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting empty or whitespace-only values
            /// with [`DiagnosticsError::InvalidArgument`].
            pub fn new(value: impl Into<String>) -> Result<Self, DiagnosticsError> {
                let v = value.into();
                if v.trim().is_empty() {
                    Err(DiagnosticsError::invalid_argument($arg, "must not be empty"))
                } else {
                    Ok(Self(v))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DiagnosticsError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = DiagnosticsError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for UUID-backed identifiers.
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display,
// FromStr (InvalidArgument on malformed input).
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident, $arg:literal
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = DiagnosticsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| DiagnosticsError::invalid_argument($arg, e.to_string()))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (caller supplied)
// ---------------------------------------------------------------------------

string_id! {
    /// Instrumentation key identifying the target application resource.
    ///
    /// Opaque to the client. Used as the first path segment of every request.
    InstrumentationKey, "ikey"
}

string_id! {
    /// A named pool of lease capacity, enforced independently of other
    /// namespaces under the same instrumentation key.
    LeaseNamespace, "lease_namespace"
}

string_id! {
    /// Opaque blob version token returned by the storage layer after a write.
    ///
    /// Sent verbatim as `If-Match` on commit. Only the service compares it.
    ETag, "etag"
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed
// ---------------------------------------------------------------------------

uuid_id! {
    /// Caller-generated identifier scoping one artifact upload.
    ///
    /// Generate once per artifact and reuse it for the token and commit calls.
    ArtifactId, "artifact_id"
}

uuid_id! {
    /// Server-issued lease identifier. Possession proves current ownership and
    /// is required to renew or release the lease.
    LeaseId, "lease_id"
}

// ---------------------------------------------------------------------------
// Artifact kind
// ---------------------------------------------------------------------------

/// Category of a diagnostic artifact.
///
/// The set is open: kinds the service adds later are carried as
/// [`ArtifactKind::Other`]. The wire form is the camelCase name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A sampling profiler trace.
    Profile,
    /// A debugger snapshot.
    Snapshot,
    /// A process memory dump.
    Dump,
    /// An event trace.
    Trace,
    /// A log bundle.
    Log,
    /// Any other kind the service understands.
    Other(String),
}

impl ArtifactKind {
    /// Parses a kind from its wire name, case-insensitively for the known kinds.
    ///
    /// Blank names are rejected with [`DiagnosticsError::InvalidArgument`].
    pub fn new(name: impl Into<String>) -> Result<Self, DiagnosticsError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DiagnosticsError::invalid_argument(
                "artifact_kind",
                "must not be empty",
            ));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "profile" => Self::Profile,
            "snapshot" => Self::Snapshot,
            "dump" => Self::Dump,
            "trace" => Self::Trace,
            "log" => Self::Log,
            _ => Self::Other(trimmed.to_string()),
        })
    }

    /// Returns the wire name used in request paths.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Profile => "profile",
            Self::Snapshot => "snapshot",
            Self::Dump => "dump",
            Self::Trace => "trace",
            Self::Log => "log",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = DiagnosticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ArtifactKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ArtifactKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::new(name).map_err(serde::de::Error::custom)
    }
}
