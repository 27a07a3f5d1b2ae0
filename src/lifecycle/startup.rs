//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Resolve credentials once, so a proxy that cannot sign never starts
//! - Start the metrics exporter when configured
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when ready)

use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use tokio::net::TcpListener;

use crate::config::{load_config, Cli, ConfigError};
use crate::credentials::{self, CredentialError, CredentialProvider};
use crate::http::ProxyEngine;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Reasons the proxy could not start or stopped abnormally.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("could not start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("could not listen on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Start the proxy and serve until SIGINT or SIGTERM.
pub async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = load_config(&cli)?;
    tracing::info!(
        upstream = %config.target,
        region = %config.region,
        flush_interval = ?config.flush_interval,
        strict_signing = config.strict_signing,
        "Configuration loaded"
    );

    let provider = credentials::default_provider()?;
    let creds = provider.credentials().await?;
    tracing::info!(access_key_id = %creds.access_key_id, "Credentials resolved");

    if let Some(addr) = config.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening on {address}");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let engine = ProxyEngine::new(config, Arc::new(provider));
    engine.run(listener, shutdown.signalled()).await?;
    Ok(())
}
