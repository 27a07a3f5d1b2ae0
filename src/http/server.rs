//! HTTP server setup and the proxy request path.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Run each request through the signing director and the transport
//! - Stream the upstream response back with the configured flush cadence
//!
//! # Design Decisions
//! - No routing: every method and path goes to the one target
//! - No retries; an upstream failure ends that request only
//! - Configuration is passed in once and never read from globals

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::credentials::CredentialProvider;
use crate::error::ProxyError;
use crate::http::request::{
    append_forwarded_for, propagate_request_id_layer, request_id, set_request_id_layer,
};
use crate::http::response::relay;
use crate::http::transport::ForwardingTransport;
use crate::observability::metrics;
use crate::signing::SigningDirector;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub director: SigningDirector,
    pub transport: ForwardingTransport,
    pub flush_interval: Duration,
}

/// The signing reverse proxy.
pub struct ProxyEngine {
    router: Router,
    config: ProxyConfig,
}

impl ProxyEngine {
    pub fn new(config: ProxyConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let director =
            SigningDirector::new(config.target.clone(), config.region.clone(), credentials)
                .with_strict(config.strict_signing);
        let transport = ForwardingTransport::new(&config.transport);

        let state = AppState {
            director,
            transport,
            flush_interval: config.flush_interval,
        };

        let router = Self::build_router(state);
        Self { router, config }
    }

    fn build_router(state: AppState) -> Router {
        Router::new().fallback(proxy_handler).with_state(state).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id(request.headers()),
                        )
                    }),
                )
                .layer(propagate_request_id_layer()),
        )
    }

    /// Serve connections from `listener` until `shutdown` resolves, then
    /// drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.target,
            region = %self.config.region,
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Sign the request, forward it and relay the answer.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::debug!(path = %request.uri().path(), "Proxying request");

    let response = match forward(&state, request, client).await {
        Ok(response) => response,
        Err(e) => {
            if matches!(e, ProxyError::Upstream(_) | ProxyError::UpstreamTimeout(_)) {
                tracing::error!(error = %e, "Upstream error");
                metrics::record_upstream_error(e.kind());
            }
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    client: Option<SocketAddr>,
) -> Result<Response, ProxyError> {
    let mut outbound = state.director.direct(request).await?;
    if let Some(client) = client {
        append_forwarded_for(outbound.headers_mut(), client.ip());
    }

    let upstream = state.transport.send(outbound).await?;
    tracing::debug!(status = %upstream.status(), "Upstream responded");
    Ok(relay(upstream, state.flush_interval))
}
