//! Request construction for the five protocol operations.
//!
//! All requests share the same base: the configured endpoint, JSON `Accept`,
//! the configured `User-Agent`, and an optional `api-version` query parameter.
//! Caller-supplied identifiers are appended as percent-encoded path segments,
//! so no value can escape its segment.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, IF_MATCH, USER_AGENT};
use reqwest::{Method, Url};

use crate::{
    ArtifactId, ArtifactKind, ClientOptions, DiagnosticsError, ETag, HttpRequest,
    InstrumentationKey, LeaseDuration, LeaseId, LeaseMetadata, LeaseNamespace,
};

pub const LEASE_ACTION: &str = "lease-action";
pub const LEASE_DURATION: &str = "lease-duration";
pub const LEASE_ID: &str = "lease-id";

const JSON: &str = "application/json";

/// Value of the `action` query parameter on artifact requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactAction {
    GetToken,
    Commit,
}

impl ArtifactAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetToken => "GetToken",
            Self::Commit => "Commit",
        }
    }
}

/// Value of the `lease-action` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseAction {
    Acquire,
    Renew,
    Release,
}

impl LeaseAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Renew => "renew",
            Self::Release => "release",
        }
    }
}

impl std::fmt::Display for LeaseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds [`HttpRequest`]s against one endpoint.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    endpoint: Url,
    api_version: Option<String>,
    user_agent: HeaderValue,
}

impl RequestBuilder {
    pub fn new(options: &ClientOptions) -> Result<Self, DiagnosticsError> {
        let options = options.clone().validated()?;
        let user_agent = HeaderValue::from_str(&options.user_agent)
            .map_err(|e| DiagnosticsError::invalid_argument("user_agent", e.to_string()))?;
        Ok(Self {
            endpoint: options.endpoint,
            api_version: options.api_version,
            user_agent,
        })
    }

    /// `GET /api/apps/{iKey}/profile`
    pub fn get_profile(&self, ikey: &InstrumentationKey) -> Result<HttpRequest, DiagnosticsError> {
        let url = self.url(&[segment("ikey", ikey.as_str())?, "profile"], None)?;
        Ok(self.request(Method::GET, url))
    }

    /// `POST /api/apps/{iKey}/artifactkinds/{kind}/artifacts/{id}?action=GetToken`
    pub fn get_upload_token(
        &self,
        ikey: &InstrumentationKey,
        kind: &ArtifactKind,
        artifact_id: ArtifactId,
    ) -> Result<HttpRequest, DiagnosticsError> {
        self.artifact_request(ikey, kind, artifact_id, ArtifactAction::GetToken)
    }

    /// Same path as [`Self::get_upload_token`] with `action=Commit` and
    /// `If-Match: {etag}`.
    pub fn commit_upload(
        &self,
        ikey: &InstrumentationKey,
        kind: &ArtifactKind,
        artifact_id: ArtifactId,
        etag: &ETag,
    ) -> Result<HttpRequest, DiagnosticsError> {
        let mut request = self.artifact_request(ikey, kind, artifact_id, ArtifactAction::Commit)?;
        let if_match = HeaderValue::from_str(etag.as_str())
            .map_err(|e| DiagnosticsError::invalid_argument("etag", e.to_string()))?;
        request.headers.insert(IF_MATCH, if_match);
        Ok(request)
    }

    /// `PUT /api/apps/{iKey}/leases/{namespace}` with `lease-action: acquire`.
    pub fn acquire_lease(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        duration: LeaseDuration,
        metadata: Option<&LeaseMetadata>,
    ) -> Result<HttpRequest, DiagnosticsError> {
        let mut request = self.lease_request(ikey, namespace, LeaseAction::Acquire)?;
        request
            .headers
            .insert(LEASE_DURATION, HeaderValue::from(duration.as_secs()));
        if let Some(metadata) = metadata {
            let body = serde_json::to_vec(metadata)
                .map_err(|e| DiagnosticsError::invalid_argument("metadata", e.to_string()))?;
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
            request.body = Some(body);
        }
        Ok(request)
    }

    /// `PUT /api/apps/{iKey}/leases/{namespace}` with `lease-action: renew` or
    /// `release` and the lease id.
    pub fn lease_action(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        action: LeaseAction,
        lease_id: LeaseId,
    ) -> Result<HttpRequest, DiagnosticsError> {
        if action == LeaseAction::Acquire {
            return Err(DiagnosticsError::invalid_argument(
                "action",
                "acquire does not take a lease id",
            ));
        }
        let mut request = self.lease_request(ikey, namespace, action)?;
        let id = HeaderValue::from_str(&lease_id.to_string())
            .map_err(|e| DiagnosticsError::invalid_argument("lease_id", e.to_string()))?;
        request.headers.insert(LEASE_ID, id);
        Ok(request)
    }

    fn artifact_request(
        &self,
        ikey: &InstrumentationKey,
        kind: &ArtifactKind,
        artifact_id: ArtifactId,
        action: ArtifactAction,
    ) -> Result<HttpRequest, DiagnosticsError> {
        let id = artifact_id.to_string();
        let url = self.url(
            &[
                segment("ikey", ikey.as_str())?,
                "artifactkinds",
                segment("artifact_kind", kind.as_str())?,
                "artifacts",
                &id,
            ],
            Some(action.as_str()),
        )?;
        Ok(self.request(Method::POST, url))
    }

    fn lease_request(
        &self,
        ikey: &InstrumentationKey,
        namespace: &LeaseNamespace,
        action: LeaseAction,
    ) -> Result<HttpRequest, DiagnosticsError> {
        let url = self.url(
            &[
                segment("ikey", ikey.as_str())?,
                "leases",
                segment("lease_namespace", namespace.as_str())?,
            ],
            None,
        )?;
        let mut request = self.request(Method::PUT, url);
        request
            .headers
            .insert(LEASE_ACTION, HeaderValue::from_static(action.as_str()));
        Ok(request)
    }

    fn request(&self, method: Method, url: Url) -> HttpRequest {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(USER_AGENT, self.user_agent.clone());
        HttpRequest {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// `{endpoint}/api/apps/{segments...}?action=..&api-version=..`
    fn url(&self, segments: &[&str], action: Option<&str>) -> Result<Url, DiagnosticsError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DiagnosticsError::invalid_argument("endpoint", "cannot be used as a base URL")
            })?
            .pop_if_empty()
            .extend(["api", "apps"])
            .extend(segments);

        if action.is_some() || self.api_version.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(action) = action {
                query.append_pair("action", action);
            }
            if let Some(version) = &self.api_version {
                query.append_pair("api-version", version);
            }
        }
        Ok(url)
    }
}

/// Checks that `value` occupies exactly one path segment.
///
/// Percent-encoding covers `/`, `?` and friends, but `url` drops `.` and `..`
/// segments outright, which would address a different resource.
fn segment<'a>(name: &'static str, value: &'a str) -> Result<&'a str, DiagnosticsError> {
    match value {
        "." | ".." => Err(DiagnosticsError::invalid_argument(
            name,
            "must not be a dot segment",
        )),
        _ if value.trim().is_empty() => {
            Err(DiagnosticsError::invalid_argument(name, "must not be empty"))
        }
        _ => Ok(value),
    }
}
