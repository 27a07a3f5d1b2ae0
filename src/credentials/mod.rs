//! Credential resolution subsystem.
//!
//! # Data Flow
//! ```text
//! CachedProvider (memoize until close to expiry)
//!     → ChainProvider (first success wins)
//!         → environment.rs (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)
//!         → profile.rs     (~/.aws/credentials)
//!         → remote.rs      (container role or instance metadata)
//!     → Credentials snapshot handed to the signer
//! ```
//!
//! # Design Decisions
//! - The signer only sees a snapshot; refresh and caching live here
//! - Providers are shared across request tasks and must be `Send + Sync`

pub mod chain;
pub mod environment;
pub mod profile;
pub mod remote;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub use chain::{CachedProvider, ChainProvider};
pub use environment::EnvironmentProvider;
pub use profile::ProfileFileProvider;
pub use remote::RemoteRoleProvider;

/// A point-in-time set of AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the snapshot expires before `now + window`. Snapshots without
    /// an expiration never expire.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + window)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Errors raised while resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{provider}: {reason}")]
    NotFound {
        provider: &'static str,
        reason: String,
    },

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{provider}: malformed credentials: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },

    #[error("credential request to {url} failed: {source}")]
    Remote { url: String, source: reqwest::Error },

    #[error("no valid credentials found: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Source of the credentials used to sign requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Fetch the current credentials.
    async fn credentials(&self) -> Result<Credentials, CredentialError>;
}

/// A fixed snapshot serves itself.
#[async_trait]
impl CredentialProvider for Credentials {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.clone())
    }
}

/// Environment variables, then the shared credentials file, then the remote
/// role endpoint; cached until shortly before expiry.
pub fn default_provider() -> Result<CachedProvider<ChainProvider>, CredentialError> {
    let chain = ChainProvider::new(vec![
        Box::new(EnvironmentProvider::new()),
        Box::new(ProfileFileProvider::from_env()),
        Box::new(RemoteRoleProvider::from_env()?),
    ]);
    Ok(CachedProvider::new(chain))
}
