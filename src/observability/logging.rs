//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Take the log filter from `RUST_LOG`, with a sensible default
//!
//! # Design Decisions
//! - Human-readable format on stderr; the filter decides verbosity

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "aws_signing_proxy=info,tower_http=info";

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
