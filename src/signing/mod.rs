//! Request signing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → director.rs  (rewrite destination, buffer body)
//!     → canonical.rs (canonical request)
//!     → sigv4.rs     (string to sign, key chain, Authorization)
//!     → director.rs  (merge signed headers, overwrite not append)
//!     → Transport
//! ```
//!
//! # Design Decisions
//! - Signature computation is pure; credentials and the clock are inputs
//! - The body is read once into a shared buffer used for both the payload
//!   digest and forwarding
//! - Credential caching and refresh belong to the provider, not the signer

pub mod canonical;
pub mod director;
pub mod sigv4;

pub use director::{SigningDirector, SERVICE};
pub use sigv4::{compute_signature, SignedHeaderSet, SigningError, SigningParams};
