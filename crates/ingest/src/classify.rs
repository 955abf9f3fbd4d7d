//! Response classification.
//!
//! 2xx passes through. Anything else becomes a typed [`DiagnosticsError`],
//! enriched with whatever structured error the body carries. Reading that
//! structured error is best-effort: a body that does not parse still produces
//! the failure, just without code and message.
//!
//! Lease calls go through [`lease_failure`] instead of [`service_failure`]
//! because a 409 there means "no capacity" (or "no longer yours"), which
//! callers must be able to tell apart from an operational fault.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::{DiagnosticsError, HttpResponse, LeaseNamespace, ServiceError};

/// `{ "error": { "code": ..., "message": ... } }`
#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(alias = "Error")]
    error: ServiceError,
}

/// Returns the response unchanged when it is a success, otherwise the
/// classified failure.
pub(crate) fn ensure_success(response: HttpResponse) -> Result<HttpResponse, DiagnosticsError> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(service_failure(&response))
    }
}

/// Deserializes the body of a successful response.
///
/// A body that does not match `T` is a contract breach, reported as
/// [`DiagnosticsError::ProtocolViolation`].
pub(crate) fn read_json<T: DeserializeOwned>(
    response: &HttpResponse,
    operation: &'static str,
) -> Result<T, DiagnosticsError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        DiagnosticsError::protocol_violation(
            operation,
            format!("response body could not be deserialized: {e}"),
        )
    })
}

/// Builds the generic failure for a non-success response.
pub(crate) fn service_failure(response: &HttpResponse) -> DiagnosticsError {
    let service_error = parse_service_error(&response.body);
    let message = failure_message(response.status, service_error.as_ref());
    warn!(
        status = response.status.as_u16(),
        code = service_error.as_ref().and_then(|e| e.code.as_deref()),
        "service request failed"
    );
    DiagnosticsError::ServiceRequestFailed {
        status: response.status,
        message,
        service_error,
        retry_after: retry_after(response),
    }
}

/// Builds the failure for a non-success lease response: 409 is
/// [`DiagnosticsError::LeaseUnavailable`], everything else is generic.
pub(crate) fn lease_failure(response: &HttpResponse, namespace: &LeaseNamespace) -> DiagnosticsError {
    if response.status != StatusCode::CONFLICT {
        return service_failure(response);
    }
    let service_error = parse_service_error(&response.body);
    warn!(
        namespace = %namespace,
        code = service_error.as_ref().and_then(|e| e.code.as_deref()),
        "lease unavailable"
    );
    DiagnosticsError::LeaseUnavailable {
        namespace: namespace.clone(),
        status: response.status,
        service_error,
        retry_after: retry_after(response),
    }
}

/// Extracts a structured service error from a failure body, if there is one.
///
/// Accepts the `{ "error": {...} }` envelope and a bare `{ "code", "message" }`
/// object. Anything else yields `None`.
pub(crate) fn parse_service_error(body: &[u8]) -> Option<ServiceError> {
    if body.is_empty() {
        return None;
    }
    let parsed = serde_json::from_slice::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .or_else(|_| serde_json::from_slice::<ServiceError>(body))
        .ok()?;
    (!parsed.is_empty()).then_some(parsed)
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
pub(crate) fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn failure_message(status: StatusCode, service_error: Option<&ServiceError>) -> String {
    let mut message = format!("Service request failed with status {}", status.as_u16());
    if let Some(reason) = status.canonical_reason() {
        message.push_str(&format!(" ({reason})"));
    }
    message.push('.');
    if let Some(error) = service_error {
        if let Some(code) = &error.code {
            message.push_str(&format!(" Code: {code}."));
        }
        if let Some(detail) = &error.message {
            message.push_str(&format!(" Message: {detail}"));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn response(status: u16, body: &str) -> HttpResponse {
        let mut response = HttpResponse::new(StatusCode::from_u16(status).unwrap());
        response.body = body.as_bytes().to_vec();
        response
    }

    fn namespace() -> LeaseNamespace {
        LeaseNamespace::new("agents").unwrap()
    }

    #[rstest]
    #[case(200)]
    #[case(201)]
    #[case(204)]
    #[case(299)]
    fn success_statuses_pass_through(#[case] status: u16) {
        assert!(ensure_success(response(status, "")).is_ok());
    }

    #[test]
    fn failure_message_includes_code_and_message() {
        let err = ensure_success(response(
            400,
            r#"{ "error": { "code": "Foo", "message": "Bar" } }"#,
        ))
        .unwrap_err();

        let text = err.to_string();
        assert!(text.contains("400"), "{text}");
        assert!(text.contains("Bad Request"), "{text}");
        assert!(text.contains("Foo"), "{text}");
        assert!(text.contains("Bar"), "{text}");
        assert_eq!(
            err.service_error(),
            Some(&ServiceError {
                code: Some("Foo".into()),
                message: Some("Bar".into()),
            })
        );
    }

    #[test]
    fn pascal_case_envelope_is_accepted() {
        let parsed = parse_service_error(br#"{"Error":{"Code":"Throttled","Message":"slow down"}}"#);
        assert_eq!(parsed.and_then(|e| e.code).as_deref(), Some("Throttled"));
    }

    #[test]
    fn flat_error_body_is_accepted() {
        let parsed = parse_service_error(br#"{"code":"NotFound"}"#).unwrap();
        assert_eq!(parsed.code.as_deref(), Some("NotFound"));
        assert_eq!(parsed.message, None);
    }

    #[rstest]
    #[case::html("<html>oops</html>")]
    #[case::empty("")]
    #[case::unrelated_json(r#"{"detail":"x"}"#)]
    #[case::array("[1,2]")]
    fn unparsable_body_still_fails(#[case] body: &str) {
        let err = ensure_success(response(500, body)).unwrap_err();
        match err {
            DiagnosticsError::ServiceRequestFailed {
                status,
                message,
                service_error,
                ..
            } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(
                    message,
                    "Service request failed with status 500 (Internal Server Error)."
                );
                assert!(service_error.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_has_no_reason_phrase() {
        let err = ensure_success(response(599, "")).unwrap_err();
        assert_eq!(err.to_string(), "Service request failed with status 599.");
    }

    #[test]
    fn retry_after_seconds_are_read() {
        let mut throttled = response(429, "");
        throttled
            .headers
            .insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&throttled), Some(Duration::from_secs(12)));

        throttled.headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&throttled), None);
    }

    #[test]
    fn conflict_on_lease_is_lease_unavailable() {
        let err = lease_failure(
            &response(409, r#"{"error":{"code":"LeaseLimitReached"}}"#),
            &namespace(),
        );
        match err {
            DiagnosticsError::LeaseUnavailable {
                namespace,
                status,
                service_error,
                ..
            } => {
                assert_eq!(namespace.as_str(), "agents");
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(
                    service_error.and_then(|e| e.code).as_deref(),
                    Some("LeaseLimitReached")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(400)]
    #[case(404)]
    #[case(412)]
    #[case(429)]
    #[case(503)]
    fn other_lease_statuses_are_generic(#[case] status: u16) {
        let err = lease_failure(&response(status, ""), &namespace());
        assert!(matches!(err, DiagnosticsError::ServiceRequestFailed { .. }));
    }

    #[test]
    fn undeserializable_success_body_is_protocol_violation() {
        let err = read_json::<crate::AppProfile>(&response(200, "not json"), "get_profile")
            .unwrap_err();
        assert!(matches!(
            err,
            DiagnosticsError::ProtocolViolation {
                operation: "get_profile",
                ..
            }
        ));
    }
}
