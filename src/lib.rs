//! Reverse proxy that signs every forwarded request with AWS Signature
//! Version 4, so clients can reach a credential-protected search endpoint
//! without holding AWS secrets themselves.

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod signing;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyEngine;
pub use lifecycle::Shutdown;
pub use signing::SigningDirector;
