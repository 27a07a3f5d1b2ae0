//! Outbound connection handling.
//!
//! # Responsibilities
//! - Dial the upstream over plain TCP or TLS (native root store, bundled
//!   Mozilla roots when the host has none)
//! - Apply dial timeout, TCP keep-alive and idle-pool pruning
//! - Bound the TLS handshake separately from the dial
//! - Honor `HTTP_PROXY` / `HTTPS_PROXY` / `NO_PROXY`
//!
//! # Design Decisions
//! - One pooled client shared by every request task; checkout is pool-internal
//! - Only HTTP/1.1 is spoken upstream
//! - A single upstream host, so the per-host idle ceiling is the global one
//! - TLS always uses the ring provider, never the process default

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::PROXY_AUTHORIZATION;
use axum::http::uri::Scheme;
use axum::http::{HeaderValue, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_rustls::{ConfigBuilderExt, MaybeHttpsStream};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::client::proxy::matcher::{Intercept, Matcher};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tower::Service;

use crate::config::TransportConfig;
use crate::error::ProxyError;

/// Upper bound on the TLS handshake, counted from the end of the dial.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections kept in the pool.
pub const MAX_IDLE_CONNECTIONS: usize = 100;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type UpstreamClient = Client<UpstreamConnector, Body>;

/// Raised when the TLS handshake outlasts [`TLS_HANDSHAKE_TIMEOUT`].
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("TLS handshake with upstream timed out")]
pub struct ConnectTimeout;

#[derive(Debug, thiserror::Error)]
#[error("upstream uri has no host")]
struct MissingHost;

/// Connection to the upstream, possibly through a forward proxy.
pub struct UpstreamStream {
    inner: MaybeHttpsStream<TokioIo<TcpStream>>,
    proxied: bool,
}

impl Connection for UpstreamStream {
    fn connected(&self) -> Connected {
        // absolute-form request targets when talking to a forward proxy
        self.inner.connected().proxy(self.proxied)
    }
}

impl hyper::rt::Read for UpstreamStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for UpstreamStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }
}

/// Dials the upstream (or a forward proxy), then runs the TLS handshake
/// under its own deadline.
#[derive(Clone)]
pub struct UpstreamConnector {
    http: HttpConnector,
    tls: TlsConnector,
    proxies: Arc<Matcher>,
    handshake_timeout: Duration,
}

impl UpstreamConnector {
    pub fn new(http: HttpConnector, proxies: Matcher, handshake_timeout: Duration) -> Self {
        Self {
            http,
            tls: TlsConnector::from(Arc::new(client_tls_config())),
            proxies: Arc::new(proxies),
            handshake_timeout,
        }
    }

    /// Forward proxy for `dst`, if any. Loopback destinations and proxies
    /// that do not speak plain HTTP are never used.
    fn proxy_for(&self, dst: &Uri) -> Option<Intercept> {
        if is_loopback(dst) {
            return None;
        }
        self.proxies
            .intercept(dst)
            .filter(|proxy| proxy.uri().scheme() == Some(&Scheme::HTTP))
    }

    /// `Proxy-Authorization` for plain-HTTP requests sent through a proxy.
    /// Tunnelled requests carry it on the CONNECT instead.
    fn forward_proxy_auth(&self, dst: &Uri) -> Option<HeaderValue> {
        if dst.scheme() == Some(&Scheme::HTTPS) {
            return None;
        }
        self.proxy_for(dst)?.basic_auth().cloned()
    }

    async fn connect(mut self, dst: Uri) -> Result<UpstreamStream, BoxError> {
        let https = dst.scheme() == Some(&Scheme::HTTPS);
        let proxy = self.proxy_for(&dst);

        let tcp = match &proxy {
            Some(proxy) if https => {
                let mut tunnel = Tunnel::new(proxy.uri().clone(), self.http.clone());
                if let Some(auth) = proxy.basic_auth() {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                tunnel.call(dst.clone()).await?
            }
            Some(proxy) => self.http.call(proxy.uri().clone()).await?,
            None => self.http.call(dst.clone()).await?,
        };

        if !https {
            return Ok(UpstreamStream {
                inner: MaybeHttpsStream::Http(tcp),
                proxied: proxy.is_some(),
            });
        }

        let host = dst
            .host()
            .ok_or(MissingHost)?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let server_name = ServerName::try_from(host.to_owned())?;

        let handshake = self.tls.connect(server_name, TokioIo::new(tcp));
        let stream = match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(stream) => stream?,
            Err(_) => return Err(ConnectTimeout.into()),
        };

        Ok(UpstreamStream {
            inner: MaybeHttpsStream::Https(TokioIo::new(stream)),
            proxied: false,
        })
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

/// Pooled HTTP(S) client used to reach the upstream.
#[derive(Clone)]
pub struct ForwardingTransport {
    client: UpstreamClient,
    connector: UpstreamConnector,
    idle_timeout: Option<Duration>,
    dial_timeout: Option<Duration>,
}

impl ForwardingTransport {
    /// Build the transport, taking forward-proxy settings from the
    /// environment.
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_proxies(config, Matcher::from_env())
    }

    pub fn with_proxies(config: &TransportConfig, proxies: Matcher) -> Self {
        let dial_timeout = non_zero(config.dial_timeout);
        let idle_timeout = non_zero(config.idle_conn_timeout);

        let mut http = HttpConnector::new();
        http.set_connect_timeout(dial_timeout);
        http.set_keepalive(non_zero(config.dial_keep_alive));
        http.set_nodelay(true);
        http.enforce_http(false);

        let connector = UpstreamConnector::new(http, proxies, TLS_HANDSHAKE_TIMEOUT);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(idle_timeout)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .pool_timer(TokioTimer::new())
            .build(connector.clone());

        tracing::info!(
            dial_timeout = ?dial_timeout,
            dial_keep_alive = ?non_zero(config.dial_keep_alive),
            idle_conn_timeout = ?idle_timeout,
            handshake_timeout = ?TLS_HANDSHAKE_TIMEOUT,
            max_idle = MAX_IDLE_CONNECTIONS,
            "Upstream transport configured"
        );

        Self {
            client,
            connector,
            idle_timeout,
            dial_timeout,
        }
    }

    /// Send one request upstream. No retries.
    pub async fn send(&self, mut request: Request<Body>) -> Result<Response<Incoming>, ProxyError> {
        if let Some(auth) = self.connector.forward_proxy_auth(request.uri()) {
            request.headers_mut().insert(PROXY_AUTHORIZATION, auth);
        }
        self.client
            .request(request)
            .await
            .map_err(ProxyError::from_upstream)
    }

    /// How long an unused pooled connection is kept; `None` keeps it forever.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// TCP dial deadline; `None` leaves dialing to the OS.
    pub fn dial_timeout(&self) -> Option<Duration> {
        self.dial_timeout
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.connector.handshake_timeout
    }
}

fn client_tls_config() -> ClientConfig {
    let versions = || {
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("ring supports the default protocol versions")
    };

    let mut config = match versions().with_native_roots() {
        Ok(roots) => roots.with_no_client_auth(),
        Err(e) => {
            tracing::warn!(error = %e, "No usable native root certificates; using bundled roots");
            versions().with_webpki_roots().with_no_client_auth()
        }
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}

fn is_loopback(dst: &Uri) -> bool {
    let Some(host) = dst.host() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}
