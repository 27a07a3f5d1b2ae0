//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command-line flags (+ their environment variables)
//!     → cli.rs (clap parse into a RawConfig layer)
//! config file (TOML)
//!     → loader.rs (discover, parse into a RawConfig layer)
//!     → layers merged: flag > env > file
//!     → validation.rs (semantic checks, defaults)
//!     → ProxyConfig (validated, immutable)
//!     → passed by value into the ProxyEngine
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never reloaded
//! - Validation returns all errors, not just the first

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{ProxyConfig, RawConfig, TargetEndpoint, TransportConfig};
