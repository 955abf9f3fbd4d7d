//! Error taxonomy and retry-policy types for the ingestion client.
//!
//! [`DiagnosticsError`] has one variant per outcome a caller must branch on.
//! Callers match on the variant, never on message text. In particular
//! [`DiagnosticsError::LeaseUnavailable`] is the expected "no capacity"
//! backpressure signal and is kept apart from every operational failure.
//!
//! [`RetryPolicy`] is the cross-cutting answer to "may I try this again?".
//! The client never retries on its own (see `ClientOptions::renewal_retry`
//! for the one opt-in exception); it only reports.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LeaseNamespace, ServiceError, TransportError};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt, taken from the service's
        /// `Retry-After` header. `None` means apply the caller's own schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried as-is.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Every failure (and the cancellation outcome) an ingestion operation can
/// produce.
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// Caller input was malformed. Raised before any network call.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The service answered with success but broke its contract: a required
    /// header was missing or malformed, or the body could not be deserialized.
    ///
    /// This is a defect on one side or the other; it is not retried.
    #[error("Protocol violation in {operation}: {message}")]
    ProtocolViolation {
        /// Client operation that observed the violation.
        operation: &'static str,
        /// Description of the violated expectation.
        message: String,
    },

    /// No lease is available: the namespace is at capacity (acquire), or the
    /// lease is no longer held by the caller (renew/release).
    ///
    /// Expected contention. Wait and try again.
    #[error("Lease unavailable in namespace '{namespace}' ({status})")]
    LeaseUnavailable {
        /// Namespace whose capacity was exhausted.
        namespace: LeaseNamespace,
        /// Status the service answered with.
        status: StatusCode,
        /// Structured service error, when the body carried one.
        service_error: Option<ServiceError>,
        /// Back-off hint from `Retry-After`, when present.
        retry_after: Option<Duration>,
    },

    /// Any other non-success response.
    #[error("{message}")]
    ServiceRequestFailed {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Human-readable summary: status, reason phrase, and service error
        /// code/message when available.
        message: String,
        /// Structured service error, when the body carried one.
        service_error: Option<ServiceError>,
        /// Back-off hint from `Retry-After`, when present.
        retry_after: Option<Duration>,
    },

    /// The transport could not produce a response at all.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The caller's cancellation token fired. Not a failure of the service.
    #[error("Operation cancelled")]
    Cancelled,
}

impl DiagnosticsError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol_violation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            operation,
            message: message.into(),
        }
    }

    /// Returns `true` for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for the lease backpressure signal.
    pub fn is_lease_unavailable(&self) -> bool {
        matches!(self, Self::LeaseUnavailable { .. })
    }

    /// HTTP status carried by the error, if the service responded.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::LeaseUnavailable { status, .. } | Self::ServiceRequestFailed { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Structured service error carried by the error, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::LeaseUnavailable { service_error, .. }
            | Self::ServiceRequestFailed { service_error, .. } => service_error.as_ref(),
            _ => None,
        }
    }

    /// Whether the failed call may be retried by the caller.
    ///
    /// Server-side throttling and transient statuses (408, 429, 5xx), transport
    /// failures and lease contention are retryable. Everything else is not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::LeaseUnavailable { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::ServiceRequestFailed {
                status,
                retry_after,
                ..
            } if is_transient_status(*status) => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Transport(_) => RetryPolicy::Retryable { after: None },
            Self::ServiceRequestFailed { .. }
            | Self::InvalidArgument { .. }
            | Self::ProtocolViolation { .. }
            | Self::Cancelled => RetryPolicy::NonRetryable,
        }
    }
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
