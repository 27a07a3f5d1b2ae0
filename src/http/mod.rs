//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (hop-by-hop stripping, X-Forwarded-For)
//!     → signing director (rewrite, buffer, sign, merge)
//!     → transport.rs (pooled HTTP/1.1 client, TLS)
//!     → response.rs (flush-cadence body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use request::X_REQUEST_ID;
pub use response::{relay, FlushingBody, FLUSH_THRESHOLD};
pub use server::ProxyEngine;
pub use transport::ForwardingTransport;
