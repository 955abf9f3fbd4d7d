//! The ingestion client.
//!
//! [`DiagnosticsClient`] is stateless between calls. It holds a transport and a
//! request builder, nothing else: no lease table, no artifact registry. All
//! coordination state lives on the service and is addressed by the explicit
//! identifiers passed on every call, so one client can serve any number of
//! concurrent uploads and lease holders.
//!
//! ## Artifact lifecycle
//!
//! 1. [`DiagnosticsClient::get_upload_token`] returns a write-capable blob URI.
//! 2. The caller writes the bytes there and keeps the blob's ETag.
//! 3. [`DiagnosticsClient::commit_upload`] commits that exact blob version.
//!
//! ## Leases
//!
//! [`DiagnosticsClient::acquire_lease`] either grants a [`Lease`] or fails with
//! [`DiagnosticsError::LeaseUnavailable`] when the namespace is at capacity.
//! The caller renews before the duration elapses and releases when done; the
//! client runs no timers.
//!
//! ## Cancellation
//!
//! Every operation takes a [`CancellationToken`]. Cancellation aborts the
//! in-flight request and yields [`DiagnosticsError::Cancelled`].

use std::sync::Arc;

use reqwest::header::LOCATION;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classify;
use crate::errors::is_transient_status;
use crate::request::{LeaseAction, RequestBuilder, LEASE_ID};
use crate::{
    AppProfile, ArtifactAccepted, ArtifactId, ArtifactKind, ClientOptions, DiagnosticsError,
    ETag, HttpRequest, HttpResponse, InstrumentationKey, Lease, LeaseDuration, LeaseId,
    LeaseMetadata, LeaseNamespace, RenewalRetry, Transport, UploadToken,
};

/// Client for the diagnostic-artifact ingestion service.
pub struct DiagnosticsClient<T> {
    transport: Arc<T>,
    requests: RequestBuilder,
    renewal_retry: RenewalRetry,
}

impl<T> Clone for DiagnosticsClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            requests: self.requests.clone(),
            renewal_retry: self.renewal_retry,
        }
    }
}

impl<T> std::fmt::Debug for DiagnosticsClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsClient")
            .field("requests", &self.requests)
            .field("renewal_retry", &self.renewal_retry)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> DiagnosticsClient<T> {
    /// Creates a client that owns `transport`.
    ///
    /// Fails with [`DiagnosticsError::InvalidArgument`] when the options are
    /// unusable (non-HTTP endpoint, invalid user agent).
    pub fn new(transport: T, options: ClientOptions) -> Result<Self, DiagnosticsError> {
        Self::with_shared_transport(Arc::new(transport), options)
    }

    /// Creates a client over a transport shared with other components.
    pub fn with_shared_transport(
        transport: Arc<T>,
        options: ClientOptions,
    ) -> Result<Self, DiagnosticsError> {
        Ok(Self {
            requests: RequestBuilder::new(&options)?,
            renewal_retry: options.renewal_retry,
            transport,
        })
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// Looks up the profile for `ikey`. Idempotent.
    #[instrument(skip_all, fields(ikey = %ikey))]
    pub async fn get_profile(
        &self,
        ikey: &InstrumentationKey,
        cancel: &CancellationToken,
    ) -> Result<AppProfile, DiagnosticsError> {
        let request = self.requests.get_profile(ikey)?;
        let response = classify::ensure_success(self.send(request, cancel).await?)?;
        classify::read_json(&response, "get_profile")
    }

    // -----------------------------------------------------------------------
    // Artifact lifecycle
    // -----------------------------------------------------------------------

    /// Asks the service where to write the artifact.
    ///
    /// The returned token's URI is taken verbatim from the `Location` header. A
    /// success response without a usable `Location` is a
    /// [`DiagnosticsError::ProtocolViolation`].
    #[instrument(skip_all, fields(ikey = %ikey, kind = %kind, artifact_id = %artifact_id))]
    pub async fn get_upload_token(
        &self,
        ikey: &InstrumentationKey,
        kind: &ArtifactKind,
        artifact_id: ArtifactId,
        cancel: &CancellationToken,
    ) -> Result<UploadToken, DiagnosticsError> {
        const OPERATION: &str = "get_upload_token";

        let request = self.requests.get_upload_token(ikey, kind, artifact_id)?;
        let response = classify::ensure_success(self.send(request, cancel).await?)?;

        let location = match response.headers.get(LOCATION) {
            Some(value) => value.to_str().map_err(|_| {
                DiagnosticsError::protocol_violation(
                    OPERATION,
                    "Location header is not valid text",
                )
            })?,
            None => {
                return Err(DiagnosticsError::protocol_violation(
                    OPERATION,
                    "response is missing the Location header",
                ))
            }
        };
        let token = UploadToken::from_location(location.trim()).map_err(|e| {
            DiagnosticsError::protocol_violation(
                OPERATION,
                format!("Location header is not an absolute URI: {e}"),
            )
        })?;

        debug!("upload token issued");
        Ok(token)
    }

    /// Commits the blob version identified by `etag`.
    ///
    /// The commit is conditional (`If-Match`): if the blob changed since the
    /// caller's write, the service rejects it and this returns
    /// [`DiagnosticsError::ServiceRequestFailed`] with the service's status.
    #[instrument(skip_all, fields(ikey = %ikey, kind = %kind, artifact_id = %artifact_id))]
    pub async fn commit_upload(
        &self,
        ikey: &InstrumentationKey,
        kind: &ArtifactKind,
        artifact_id: ArtifactId,
        etag: &ETag,
        cancel: &CancellationToken,
    ) -> Result<ArtifactAccepted, DiagnosticsError> {
        let request = self.requests.commit_upload(ikey, kind, artifact_id, etag)?;
        let response = classify::ensure_success(self.send(request, cancel).await?)?;
        let accepted = classify::read_json(&response, "commit_upload")?;
        info!("artifact committed");
        Ok(accepted)
    }

    // -----------------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------------

    /// Tries to take one lease in `namespace`.
    ///
    /// `duration` is forwarded as-is; the service decides whether it is
    /// acceptable. `metadata` is attached for diagnostics only.
    ///
    /// A 409 means the namespace is at capacity and is reported as
    /// [`DiagnosticsError::LeaseUnavailable`]. No other status maps there.
    #[instrument(skip_all, fields(ikey = %ikey, namespace = %namespace, duration = %duration))]
    pub async fn acquire_lease(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        duration: LeaseDuration,
        metadata: Option<&LeaseMetadata>,
        cancel: &CancellationToken,
    ) -> Result<Lease, DiagnosticsError> {
        const OPERATION: &str = "acquire_lease";

        let request = self
            .requests
            .acquire_lease(ikey, namespace, duration, metadata)?;
        let response = self.send(request, cancel).await?;
        if !response.status.is_success() {
            return Err(classify::lease_failure(&response, namespace));
        }

        let raw = response.header_str(LEASE_ID).ok_or_else(|| {
            DiagnosticsError::protocol_violation(
                OPERATION,
                format!("{} response is missing the lease-id header", response.status),
            )
        })?;
        let id = raw.parse::<LeaseId>().map_err(|_| {
            DiagnosticsError::protocol_violation(
                OPERATION,
                format!("lease-id header '{raw}' is not a GUID"),
            )
        })?;

        info!(lease_id = %id, "lease acquired");
        Ok(Lease {
            id,
            namespace: namespace.clone(),
            duration,
        })
    }

    /// Extends a held lease.
    ///
    /// Must be called before the lease's duration elapses. A 409 means the
    /// lease is no longer the caller's and is reported as
    /// [`DiagnosticsError::LeaseUnavailable`]. Transient failures are retried
    /// only when [`ClientOptions::renewal_retry`] allows it.
    #[instrument(skip_all, fields(ikey = %ikey, namespace = %namespace, lease_id = %lease_id))]
    pub async fn renew_lease(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        lease_id: LeaseId,
        cancel: &CancellationToken,
    ) -> Result<(), DiagnosticsError> {
        let retry = self.renewal_retry;
        let mut attempt = 0u32;
        loop {
            match self
                .lease_action(ikey, namespace, LeaseAction::Renew, lease_id, cancel)
                .await
            {
                Err(err) if attempt < retry.max_retries && is_renewal_retryable(&err) => {
                    attempt += 1;
                    warn!(attempt, max_retries = retry.max_retries, error = %err, "retrying lease renewal");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(DiagnosticsError::Cancelled),
                        _ = tokio::time::sleep(retry.delay()) => {}
                    }
                }
                Ok(()) => {
                    debug!("lease renewed");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Gives a lease back so another caller can take the slot.
    #[instrument(skip_all, fields(ikey = %ikey, namespace = %namespace, lease_id = %lease_id))]
    pub async fn release_lease(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        lease_id: LeaseId,
        cancel: &CancellationToken,
    ) -> Result<(), DiagnosticsError> {
        self.lease_action(ikey, namespace, LeaseAction::Release, lease_id, cancel)
            .await?;
        info!("lease released");
        Ok(())
    }

    async fn lease_action(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        action: LeaseAction,
        lease_id: LeaseId,
        cancel: &CancellationToken,
    ) -> Result<(), DiagnosticsError> {
        let request = self
            .requests
            .lease_action(ikey, namespace, action, lease_id)?;
        let response = self.send(request, cancel).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(classify::lease_failure(&response, namespace))
        }
    }

    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, DiagnosticsError> {
        if cancel.is_cancelled() {
            return Err(DiagnosticsError::Cancelled);
        }
        debug!(method = %request.method, path = request.url.path(), "sending request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DiagnosticsError::Cancelled),
            result = self.transport.send(request) => result?,
        };
        debug!(status = response.status.as_u16(), "response received");
        Ok(response)
    }
}

fn is_renewal_retryable(err: &DiagnosticsError) -> bool {
    match err {
        DiagnosticsError::Transport(_) => true,
        DiagnosticsError::ServiceRequestFailed { status, .. } => is_transient_status(*status),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::header::{HeaderValue, IF_MATCH};
    use reqwest::{Method, StatusCode};
    use rstest::rstest;

    use super::*;
    use crate::request::{LEASE_ACTION, LEASE_DURATION};
    use crate::TransportError;

    // -----------------------------------------------------------------------
    // Scripted transport
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
        cancel_on_send: Option<CancellationToken>,
    }

    impl ScriptedTransport {
        fn replying(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            if let Some(cancel) = &self.cancel_on_send {
                cancel.cancel();
                std::future::pending::<()>().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse::new(StatusCode::from_u16(code).unwrap())
    }

    fn with_header(mut response: HttpResponse, name: &'static str, value: &'static str) -> HttpResponse {
        response.headers.insert(name, HeaderValue::from_static(value));
        response
    }

    fn with_body(mut response: HttpResponse, body: &str) -> HttpResponse {
        response.body = body.as_bytes().to_vec();
        response
    }

    fn client(transport: ScriptedTransport) -> (DiagnosticsClient<ScriptedTransport>, Arc<ScriptedTransport>) {
        client_with(transport, ClientOptions::from_endpoint("https://ingest.example.com/").unwrap())
    }

    fn client_with(
        transport: ScriptedTransport,
        options: ClientOptions,
    ) -> (DiagnosticsClient<ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let client = DiagnosticsClient::with_shared_transport(Arc::clone(&transport), options).unwrap();
        (client, transport)
    }

    fn ikey() -> InstrumentationKey {
        InstrumentationKey::new("abc").unwrap()
    }

    fn agents() -> LeaseNamespace {
        LeaseNamespace::new("agents").unwrap()
    }

    fn artifact_id() -> ArtifactId {
        "11111111-1111-1111-1111-111111111111".parse().unwrap()
    }

    const LEASE_GUID: &str = "22222222-2222-2222-2222-222222222222";

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_profile_deserializes_body() {
        let (client, transport) = client(ScriptedTransport::replying(vec![Ok(with_body(
            status(200),
            r#"{"appId":"33333333-3333-3333-3333-333333333333","stampId":"stamp-1"}"#,
        ))]));

        let profile = client
            .get_profile(&ikey(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(profile.stamp_id.as_deref(), Some("stamp-1"));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url.path(), "/api/apps/abc/profile");
    }

    #[tokio::test]
    async fn get_profile_with_bad_body_is_protocol_violation() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(with_body(
            status(200),
            "<html/>",
        ))]));

        let err = client
            .get_profile(&ikey(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiagnosticsError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn get_profile_not_found_is_service_request_failed() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(with_body(
            status(404),
            r#"{"error":{"code":"AppNotFound","message":"no such app"}}"#,
        ))]));

        let err = client
            .get_profile(&ikey(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            DiagnosticsError::ServiceRequestFailed { status, message, .. } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(message.contains("AppNotFound"));
                assert!(message.contains("no such app"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Artifact lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upload_token_location_is_returned_verbatim() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(with_header(
            status(200),
            "location",
            "https://store:443?sig=xyz",
        ))]));

        let token = client
            .get_upload_token(&ikey(), &ArtifactKind::Dump, artifact_id(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.location(), "https://store:443?sig=xyz");
        assert_eq!(token.blob_uri().as_str(), "https://store/?sig=xyz");
    }

    #[tokio::test]
    async fn upload_token_comes_from_location_header() {
        let (client, transport) = client(ScriptedTransport::replying(vec![Ok(with_header(
            status(200),
            "location",
            "https://store/blob?sig=xyz",
        ))]));

        let token = client
            .get_upload_token(&ikey(), &ArtifactKind::Dump, artifact_id(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.blob_uri().as_str(), "https://store/blob?sig=xyz");
        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.url.path(),
            "/api/apps/abc/artifactkinds/dump/artifacts/11111111-1111-1111-1111-111111111111"
        );
        assert_eq!(request.url.query(), Some("action=GetToken"));
    }

    #[rstest]
    #[case::missing(None)]
    #[case::relative(Some("/blob"))]
    #[case::garbage(Some("::not a uri::"))]
    #[tokio::test]
    async fn unusable_location_is_protocol_violation(#[case] location: Option<&'static str>) {
        let response = match location {
            Some(value) => with_header(status(201), "location", value),
            None => status(201),
        };
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(response)]));

        let err = client
            .get_upload_token(&ikey(), &ArtifactKind::Dump, artifact_id(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DiagnosticsError::ProtocolViolation { operation: "get_upload_token", .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn upload_token_failure_is_classified() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(status(403))]));

        let err = client
            .get_upload_token(&ikey(), &ArtifactKind::Dump, artifact_id(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert!(matches!(err, DiagnosticsError::ServiceRequestFailed { .. }));
    }

    #[tokio::test]
    async fn commit_sends_if_match_and_returns_acceptance() {
        let (client, transport) = client(ScriptedTransport::replying(vec![Ok(with_body(
            status(200),
            r#"{"artifactId":"11111111-1111-1111-1111-111111111111","stampId":"s"}"#,
        ))]));
        let etag = ETag::new("\"0x8DC1\"").unwrap();

        let accepted = client
            .commit_upload(&ikey(), &ArtifactKind::Dump, artifact_id(), &etag, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(accepted.artifact_id, Some(artifact_id()));
        let request = &transport.requests()[0];
        assert_eq!(request.url.query(), Some("action=Commit"));
        assert_eq!(request.headers.get(IF_MATCH).unwrap(), "\"0x8DC1\"");
    }

    #[tokio::test]
    async fn etag_mismatch_is_plain_service_failure() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(with_body(
            status(412),
            r#"{"error":{"code":"ConditionNotMet","message":"etag mismatch"}}"#,
        ))]));
        let etag = ETag::new("stale").unwrap();

        let err = client
            .commit_upload(&ikey(), &ArtifactKind::Dump, artifact_id(), &etag, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DiagnosticsError::ServiceRequestFailed { status: StatusCode::PRECONDITION_FAILED, .. }
        ));
        assert!(!err.is_lease_unavailable());
    }

    // -----------------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn acquire_returns_exact_lease_id() {
        let (client, transport) = client(ScriptedTransport::replying(vec![Ok(with_header(
            status(201),
            "lease-id",
            LEASE_GUID,
        ))]));

        let lease = client
            .acquire_lease(
                &ikey(),
                &agents(),
                LeaseDuration::from_secs(30),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(lease.id.to_string(), LEASE_GUID);
        assert_eq!(lease.namespace, agents());
        assert_eq!(lease.duration.as_secs(), 30);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.url.path(), "/api/apps/abc/leases/agents");
        assert_eq!(request.headers.get(LEASE_ACTION).unwrap(), "acquire");
        assert_eq!(request.headers.get(LEASE_DURATION).unwrap(), "30");
    }

    #[rstest]
    #[case::missing(None)]
    #[case::not_a_guid(Some("lease-42"))]
    #[case::empty(Some(""))]
    #[tokio::test]
    async fn acquire_with_bad_lease_id_is_protocol_violation(#[case] lease_id: Option<&'static str>) {
        let response = match lease_id {
            Some(value) => with_header(status(201), "lease-id", value),
            None => status(201),
        };
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(response)]));

        let err = client
            .acquire_lease(&ikey(), &agents(), LeaseDuration::from_secs(30), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DiagnosticsError::ProtocolViolation { operation: "acquire_lease", .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn acquire_conflict_is_lease_unavailable() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(status(409))]));

        let err = client
            .acquire_lease(&ikey(), &agents(), LeaseDuration::from_secs(30), None, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            DiagnosticsError::LeaseUnavailable { namespace, status, .. } => {
                assert_eq!(namespace, agents());
                assert_eq!(status, StatusCode::CONFLICT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(400)]
    #[case(403)]
    #[case(404)]
    #[case(412)]
    #[case(429)]
    #[case(500)]
    #[case(503)]
    #[tokio::test]
    async fn only_conflict_means_lease_unavailable(#[case] code: u16) {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(status(code))]));

        let err = client
            .acquire_lease(&ikey(), &agents(), LeaseDuration::from_secs(30), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DiagnosticsError::ServiceRequestFailed { .. }),
            "{code}: {err:?}"
        );
    }

    #[tokio::test]
    async fn acquire_sends_metadata_body() {
        let (client, transport) = client(ScriptedTransport::replying(vec![Ok(with_header(
            status(201),
            "lease-id",
            LEASE_GUID,
        ))]));
        let metadata = LeaseMetadata::from([("pid".to_string(), "4242".to_string())]);

        client
            .acquire_lease(
                &ikey(),
                &agents(),
                LeaseDuration::from_secs(45),
                Some(&metadata),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "pid": "4242" }));
    }

    #[tokio::test]
    async fn renew_and_release_send_matching_requests() {
        let (client, transport) = client(ScriptedTransport::replying(vec![
            Ok(status(200)),
            Ok(status(200)),
        ]));
        let lease_id: LeaseId = LEASE_GUID.parse().unwrap();
        let cancel = CancellationToken::new();

        client.renew_lease(&ikey(), &agents(), lease_id, &cancel).await.unwrap();
        client.release_lease(&ikey(), &agents(), lease_id, &cancel).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let (renew, release) = (&requests[0], &requests[1]);
        assert_eq!(renew.method, release.method);
        assert_eq!(renew.url, release.url);
        assert_eq!(renew.headers.get(LEASE_ACTION).unwrap(), "renew");
        assert_eq!(release.headers.get(LEASE_ACTION).unwrap(), "release");
        assert_eq!(renew.headers.get(LEASE_ID).unwrap(), LEASE_GUID);
        assert_eq!(release.headers.get(LEASE_ID).unwrap(), LEASE_GUID);
    }

    #[tokio::test]
    async fn renew_of_lost_lease_is_lease_unavailable() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(status(409))]));

        let err = client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_lease_unavailable());
    }

    #[tokio::test]
    async fn release_failure_is_classified() {
        let (client, _) = client(ScriptedTransport::replying(vec![Ok(status(404))]));

        let err = client
            .release_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiagnosticsError::ServiceRequestFailed { status: StatusCode::NOT_FOUND, .. }
        ));
    }

    #[tokio::test]
    async fn renewal_is_not_retried_by_default() {
        let (client, transport) = client(ScriptedTransport::replying(vec![
            Ok(status(503)),
            Ok(status(200)),
        ]));

        let err = client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn renewal_retries_transient_failures_when_configured() {
        let options = ClientOptions::from_endpoint("https://ingest.example.com/")
            .unwrap()
            .with_renewal_retry(RenewalRetry::new(2, Duration::ZERO));
        let (client, transport) = client_with(
            ScriptedTransport::replying(vec![
                Err(TransportError::new("connection reset")),
                Ok(status(503)),
                Ok(status(200)),
            ]),
            options,
        );

        client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn renewal_retry_gives_up_after_limit() {
        let options = ClientOptions::from_endpoint("https://ingest.example.com/")
            .unwrap()
            .with_renewal_retry(RenewalRetry::new(1, Duration::ZERO));
        let (client, transport) = client_with(
            ScriptedTransport::replying(vec![Ok(status(500)), Ok(status(502))]),
            options,
        );

        let err = client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn renewal_never_retries_conflict() {
        let options = ClientOptions::from_endpoint("https://ingest.example.com/")
            .unwrap()
            .with_renewal_retry(RenewalRetry::new(5, Duration::ZERO));
        let (client, transport) = client_with(
            ScriptedTransport::replying(vec![Ok(status(409)), Ok(status(200))]),
            options,
        );

        let err = client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_lease_unavailable());
        assert_eq!(transport.requests().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Transport and cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let (client, _) = client(ScriptedTransport::replying(vec![Err(
            TransportError::new("dns lookup failed"),
        )]));

        let err = client
            .get_profile(&ikey(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiagnosticsError::Transport(_)));
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_network() {
        let (client, transport) = client(ScriptedTransport::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .acquire_lease(&ikey(), &agents(), LeaseDuration::from_secs(30), None, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_send_is_not_a_failure() {
        let cancel = CancellationToken::new();
        let (client, transport) = client(ScriptedTransport {
            cancel_on_send: Some(cancel.clone()),
            ..ScriptedTransport::default()
        });

        let err = client
            .renew_lease(&ikey(), &agents(), LeaseId::new_random(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!err.is_lease_unavailable());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_operations_share_one_client() {
        let (client, transport) = client(ScriptedTransport::replying(vec![
            Ok(with_header(status(201), "lease-id", LEASE_GUID)),
            Ok(with_header(status(201), "lease-id", LEASE_GUID)),
        ]));
        let cancel = CancellationToken::new();
        let other = LeaseNamespace::new("uploads").unwrap();

        let (ikey, agents) = (ikey(), agents());

        let (a, b) = tokio::join!(
            client.acquire_lease(&ikey, &agents, LeaseDuration::from_secs(20), None, &cancel),
            client.acquire_lease(&ikey, &other, LeaseDuration::from_secs(20), None, &cancel),
        );

        assert_eq!(a.unwrap().namespace, agents);
        assert_eq!(b.unwrap().namespace, other);
        assert_eq!(transport.requests().len(), 2);
    }
}
