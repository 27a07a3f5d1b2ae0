//! Per-request failures and their client-visible responses.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::http::transport::ConnectTimeout;
use crate::signing::SigningError;

/// Everything that can end a proxied request before the upstream answers.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("could not read request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("could not sign request: {0}")]
    Signing(#[from] SigningError),

    #[error("could not rewrite request for upstream: {0}")]
    Rewrite(#[from] axum::http::Error),

    #[error("upstream did not answer in time")]
    UpstreamTimeout(#[source] hyper_util::client::legacy::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

impl ProxyError {
    /// Classify a transport failure, separating dial and handshake timeouts
    /// from other connectivity errors.
    pub fn from_upstream(err: hyper_util::client::legacy::Error) -> Self {
        if is_timeout(&err) {
            ProxyError::UpstreamTimeout(err)
        } else {
            ProxyError::Upstream(err)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::Signing(_) | ProxyError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::RequestBody(_) => "request_body",
            ProxyError::Signing(_) => "signing",
            ProxyError::Rewrite(_) => "rewrite",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::Upstream(_) => "upstream",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ProxyError::RequestBody(_) => "Could not read request body",
            ProxyError::Signing(_) | ProxyError::Rewrite(_) => "Could not sign request",
            ProxyError::UpstreamTimeout(_) => "Upstream timed out",
            ProxyError::Upstream(_) => "Upstream request failed",
        };
        (status, body).into_response()
    }
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<ConnectTimeout>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}
