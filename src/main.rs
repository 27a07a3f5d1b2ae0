//! AWS signing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                 SIGNING PROXY                    │
//!                      │                                                  │
//!   Client Request     │  ┌─────────┐    ┌──────────────────────────┐     │
//!   ───────────────────┼─▶│  http   │───▶│     signing director     │     │
//!                      │  │ server  │    │ rewrite → buffer → sign  │     │
//!                      │  └─────────┘    └────────────┬─────────────┘     │
//!                      │                              │ credentials      │
//!                      │                              ▼                  │
//!                      │                  ┌──────────────────────┐       │
//!                      │                  │ env → profile → role │       │
//!                      │                  └──────────────────────┘       │
//!   Client Response    │  ┌─────────┐    ┌──────────────────────────┐     │
//!   ◀──────────────────┼──│flushing │◀───│   forwarding transport   │◀────┼──── Target
//!                      │  │  body   │    │   (pooled, TLS, HTTP/1)  │     │
//!                      │  └─────────┘    └──────────────────────────┘     │
//!                      │                                                  │
//!                      │  config · observability · lifecycle              │
//!                      └──────────────────────────────────────────────────┘
//! ```

use aws_signing_proxy::config::Cli;
use aws_signing_proxy::lifecycle::startup;
use aws_signing_proxy::observability::logging;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let cli = Cli::parse();

    tracing::info!("aws-signing-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = startup::run(cli).await {
        tracing::error!(error = %e, "Proxy failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
