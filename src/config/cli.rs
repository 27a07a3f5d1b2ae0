//! Command-line flags.
//!
//! Flags carry no defaults of their own so that an unset flag falls through
//! to the config file and then to the built-in default.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::RawConfig;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "aws-signing-proxy", version)]
#[command(about = "Reverse proxy that signs every request with AWS Signature Version 4")]
pub struct Cli {
    /// Target url to proxy to
    #[arg(long, env = "AWS_ES_TARGET")]
    pub target: Option<String>,

    /// Listening port for proxy [default: 8080]
    #[arg(long)]
    pub port: Option<u16>,

    /// Local address to listen on [default: all interfaces]
    #[arg(long)]
    pub listen_address: Option<String>,

    /// AWS region used for signing [default: us-west-2]
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Seconds between flushes to the client while copying the response body
    #[arg(long, value_name = "SECONDS")]
    pub flush_interval: Option<u64>,

    /// Seconds an idle keep-alive connection stays open; zero means no limit [default: 90]
    #[arg(long, value_name = "SECONDS")]
    pub idle_conn_timeout: Option<u64>,

    /// Seconds a dial waits for a connect to complete [default: 30]
    #[arg(long, value_name = "SECONDS")]
    pub dial_timeout: Option<u64>,

    /// Seconds between TCP keep-alive probes [default: 30]
    #[arg(long, value_name = "SECONDS")]
    pub dial_keep_alive: Option<u64>,

    /// Address to expose Prometheus metrics on
    #[arg(long)]
    pub metrics_address: Option<String>,

    /// Config file [default: /etc/aws-signing-proxy.toml, ./aws-signing-proxy.toml]
    #[arg(long, env = "AWS_SIGNING_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reject requests whose body could not be read or that could not be signed
    #[arg(long, overrides_with = "no_strict_signing")]
    pub strict_signing: bool,

    /// Forward requests even when reading the body or signing failed
    #[arg(long, overrides_with = "strict_signing")]
    pub no_strict_signing: bool,
}

impl Cli {
    /// The options given on the command line (or through their environment
    /// variables) as a configuration layer.
    pub fn to_raw(&self) -> RawConfig {
        let strict_signing = match (self.strict_signing, self.no_strict_signing) {
            (_, true) => Some(false),
            (true, false) => Some(true),
            (false, false) => None,
        };

        RawConfig {
            target: self.target.clone(),
            port: self.port,
            listen_address: self.listen_address.clone(),
            region: self.region.clone(),
            flush_interval: self.flush_interval,
            idle_conn_timeout: self.idle_conn_timeout,
            dial_timeout: self.dial_timeout,
            dial_keep_alive: self.dial_keep_alive,
            metrics_address: self.metrics_address.clone(),
            strict_signing,
        }
    }
}
