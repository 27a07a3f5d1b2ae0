//! Prepares an inbound request for the upstream.
//!
//! Order matters: the destination is rewritten first because the authority
//! is part of what gets signed, then the body is buffered, then the request
//! is signed and the signed headers are merged in.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderValue, Request, Uri, Version};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::config::TargetEndpoint;
use crate::credentials::{CredentialProvider, Credentials};
use crate::error::ProxyError;
use crate::http::request::strip_hop_by_hop;
use crate::observability::metrics;
use crate::signing::canonical::canonical_query_string;
use crate::signing::sigv4::{compute_signature, SignedHeaderSet, SigningError, SigningParams};

/// Signing name of the search service family.
pub const SERVICE: &str = "es";

/// Rewrites, signs and hands back requests bound for one target.
#[derive(Clone)]
pub struct SigningDirector {
    target: TargetEndpoint,
    region: String,
    service: String,
    credentials: Arc<dyn CredentialProvider>,
    strict: bool,
}

impl SigningDirector {
    pub fn new(
        target: TargetEndpoint,
        region: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            target,
            region: region.into(),
            service: SERVICE.to_owned(),
            credentials,
            strict: true,
        }
    }

    /// When off, body-read and signing failures are logged and the request
    /// is forwarded anyway.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Prepare `request` for the upstream, signing it as of now.
    pub async fn direct(&self, request: Request<Body>) -> Result<Request<Body>, ProxyError> {
        self.direct_at(request, Utc::now()).await
    }

    /// Prepare `request` for the upstream, signing it as of `time`.
    pub async fn direct_at(
        &self,
        mut request: Request<Body>,
        time: DateTime<Utc>,
    ) -> Result<Request<Body>, ProxyError> {
        self.rewrite_destination(&mut request)?;

        let payload = match buffer_body(&mut request).await {
            Ok(payload) => payload,
            Err(e) if self.strict => {
                tracing::warn!(error = %e, "Could not read request body; rejecting request");
                metrics::record_signing_failure("body");
                return Err(ProxyError::RequestBody(e));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read request body; signing an empty payload");
                metrics::record_signing_failure("body");
                // the body is now empty, whatever the client announced
                request.headers_mut().remove(CONTENT_LENGTH);
                Bytes::new()
            }
        };

        // no borrow of the request may live across this await: Body is !Sync
        let signed = match self.credentials.credentials().await {
            Ok(credentials) => self.sign(&request, &payload, &credentials, time),
            Err(e) => Err(e.into()),
        };

        match signed {
            Ok(signed) => merge_headers(&mut request, signed),
            Err(e) => {
                let stage = match e {
                    SigningError::Credentials(_) => "credentials",
                    _ => "signature",
                };
                metrics::record_signing_failure(stage);
                if self.strict {
                    tracing::error!(error = %e, "Could not sign request; rejecting request");
                    return Err(e.into());
                }
                tracing::error!(error = %e, "Could not sign request; forwarding it unsigned");
            }
        }

        Ok(request)
    }

    /// Point the request at the target: scheme and authority from the
    /// target, `Host` to match, query in canonical form, HTTP/1.1, and no
    /// hop-by-hop headers.
    pub fn rewrite_destination(&self, request: &mut Request<Body>) -> Result<(), ProxyError> {
        let path = request.uri().path();
        let query = request
            .uri()
            .query()
            .map(canonical_query_string)
            .unwrap_or_default();
        let path_and_query: PathAndQuery = if query.is_empty() {
            path.parse()
        } else {
            format!("{path}?{query}").parse()
        }
        .map_err(axum::http::Error::from)?;

        let uri = Uri::builder()
            .scheme(self.target.scheme().clone())
            .authority(self.target.authority().clone())
            .path_and_query(path_and_query)
            .build()?;

        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;

        let headers = request.headers_mut();
        strip_hop_by_hop(headers);
        headers.insert(
            HOST,
            HeaderValue::from_str(self.target.authority().as_str())
                .map_err(axum::http::Error::from)?,
        );
        Ok(())
    }

    /// Sign the request as it stands with an explicit credential snapshot.
    pub fn sign(
        &self,
        request: &Request<Body>,
        payload: &[u8],
        credentials: &Credentials,
        time: DateTime<Utc>,
    ) -> Result<SignedHeaderSet, SigningError> {
        let params = SigningParams {
            credentials,
            region: &self.region,
            service: &self.service,
            time,
        };
        compute_signature(
            request.method(),
            request.uri().path(),
            request.uri().query().unwrap_or_default(),
            request.headers(),
            payload,
            &params,
        )
    }
}

/// Read the whole body, put an identical copy back on the request and
/// return the bytes for hashing. Both sides share one buffer.
///
/// On failure the request is left with an empty body.
pub async fn buffer_body(request: &mut Request<Body>) -> Result<Bytes, axum::Error> {
    let body = std::mem::take(request.body_mut());
    let bytes = axum::body::to_bytes(body, usize::MAX).await?;
    *request.body_mut() = Body::from(bytes.clone());
    Ok(bytes)
}

/// Overwrite each signed header on the request. Existing values for the
/// same name are replaced, never appended to.
pub fn merge_headers(request: &mut Request<Body>, signed: SignedHeaderSet) {
    let headers = request.headers_mut();
    for (name, value) in signed.iter() {
        headers.insert(name.clone(), value.clone());
    }
}
