//! Configuration schema definitions.
//!
//! [`RawConfig`] is the loosely typed shape shared by the command line and the
//! config file: every field is optional so that layers can be merged. A
//! validated [`ProxyConfig`] is produced from it once at startup and never
//! changes afterwards.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::http::uri::{Authority, Scheme};
use serde::Deserialize;

/// Port the proxy listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Signing region used when neither flag, environment nor file name one.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Default idle pooled connection lifetime in seconds.
pub const DEFAULT_IDLE_CONN_TIMEOUT_SECS: u64 = 90;

/// Default TCP connect timeout in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 30;

/// Default TCP keep-alive probe interval in seconds.
pub const DEFAULT_DIAL_KEEP_ALIVE_SECS: u64 = 30;

/// One layer of configuration, as read from the config file or derived from
/// command-line flags. Keys use the same kebab-case spelling as the flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawConfig {
    /// Target URL to proxy to.
    pub target: Option<String>,

    /// Listening port.
    pub port: Option<u16>,

    /// Local address to listen on; empty means every IPv4 interface.
    pub listen_address: Option<String>,

    /// Signing region.
    pub region: Option<String>,

    /// Seconds between forced flushes of a response body. Zero disables.
    pub flush_interval: Option<u64>,

    /// Seconds an idle upstream connection is kept. Zero means no limit.
    pub idle_conn_timeout: Option<u64>,

    /// Seconds to wait for an upstream TCP connect.
    pub dial_timeout: Option<u64>,

    /// Seconds between TCP keep-alive probes. Zero disables probes.
    pub dial_keep_alive: Option<u64>,

    /// Optional Prometheus scrape address.
    pub metrics_address: Option<String>,

    /// Refuse to forward requests that could not be signed.
    pub strict_signing: Option<bool>,
}

impl RawConfig {
    /// Merge two layers. Values set in `over` win.
    pub fn layered_under(self, over: RawConfig) -> RawConfig {
        RawConfig {
            target: over.target.or(self.target),
            port: over.port.or(self.port),
            listen_address: over.listen_address.or(self.listen_address),
            region: over.region.or(self.region),
            flush_interval: over.flush_interval.or(self.flush_interval),
            idle_conn_timeout: over.idle_conn_timeout.or(self.idle_conn_timeout),
            dial_timeout: over.dial_timeout.or(self.dial_timeout),
            dial_keep_alive: over.dial_keep_alive.or(self.dial_keep_alive),
            metrics_address: over.metrics_address.or(self.metrics_address),
            strict_signing: over.strict_signing.or(self.strict_signing),
        }
    }
}

/// Scheme and authority of the upstream every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    scheme: Scheme,
    authority: Authority,
}

/// Reasons a target URL is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("{0}")]
    Parse(String),

    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    #[error("url has no host")]
    MissingHost,
}

impl TargetEndpoint {
    /// Parse an absolute `http` or `https` URL. Any path, query or fragment
    /// on the URL is ignored; only scheme and authority are used.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let url = url::Url::parse(raw).map_err(|e| TargetError::Parse(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(TargetError::UnsupportedScheme(other.to_owned())),
        };

        let host = url.host_str().filter(|h| !h.is_empty()).ok_or(TargetError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        let authority =
            Authority::from_str(&authority).map_err(|e| TargetError::Parse(e.to_string()))?;

        Ok(Self { scheme, authority })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Host with the port when one was given explicitly.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Outbound connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum time to establish a TCP connection. Zero means no limit.
    pub dial_timeout: Duration,

    /// TCP keep-alive probe interval. Zero disables probes.
    pub dial_keep_alive: Duration,

    /// Maximum time an unused pooled connection is retained. Zero means
    /// connections are never dropped for being idle.
    pub idle_conn_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(DEFAULT_DIAL_TIMEOUT_SECS),
            dial_keep_alive: Duration::from_secs(DEFAULT_DIAL_KEEP_ALIVE_SECS),
            idle_conn_timeout: Duration::from_secs(DEFAULT_IDLE_CONN_TIMEOUT_SECS),
        }
    }
}

/// Validated, immutable proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream every request is forwarded to.
    pub target: TargetEndpoint,

    /// Local address to listen on; empty means every IPv4 interface.
    pub listen_address: String,

    /// Listening port.
    pub port: u16,

    /// Signing region.
    pub region: String,

    /// Maximum time buffered response bytes wait before being flushed.
    /// Zero flushes only when the buffer fills or the body ends.
    pub flush_interval: Duration,

    /// Outbound connection tuning.
    pub transport: TransportConfig,

    /// Refuse to forward requests that could not be signed.
    pub strict_signing: bool,

    /// Prometheus scrape address, when metrics are exported.
    pub metrics_address: Option<SocketAddr>,
}

impl ProxyConfig {
    /// A configuration with every option at its default.
    pub fn new(target: TargetEndpoint) -> Self {
        Self {
            target,
            listen_address: String::new(),
            port: DEFAULT_PORT,
            region: DEFAULT_REGION.to_owned(),
            flush_interval: Duration::ZERO,
            transport: TransportConfig::default(),
            strict_signing: true,
            metrics_address: None,
        }
    }

    /// The `host:port` string handed to the TCP listener.
    pub fn bind_address(&self) -> String {
        let host = self.listen_address.trim();
        if host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}
