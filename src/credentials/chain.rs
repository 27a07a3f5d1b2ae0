//! Ordered provider chain and expiry-aware caching.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::credentials::{CredentialError, CredentialProvider, Credentials};

/// How long before expiry cached credentials are refreshed.
pub const EXPIRY_WINDOW_MINUTES: i64 = 5;

/// Tries each provider in order; the first success wins.
pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl CredentialProvider for ChainProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.credentials().await {
                Ok(creds) => {
                    tracing::debug!(provider = provider.name(), "Resolved credentials");
                    return Ok(creds);
                }
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "Credential provider failed");
                    failures.push(e.to_string());
                }
            }
        }
        Err(CredentialError::Exhausted(failures))
    }
}

/// Memoizes the inner provider's snapshot until it is about to expire.
///
/// Callers serialize on the cache lock, so concurrent requests trigger at
/// most one refresh.
pub struct CachedProvider<P> {
    inner: P,
    window: Duration,
    cached: Mutex<Option<Credentials>>,
}

impl<P: CredentialProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_window(inner, Duration::minutes(EXPIRY_WINDOW_MINUTES))
    }

    pub fn with_window(inner: P, window: Duration) -> Self {
        Self {
            inner,
            window,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for CachedProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let mut cached = self.cached.lock().await;
        if let Some(creds) = cached.as_ref() {
            if !creds.expires_within(Utc::now(), self.window) {
                return Ok(creds.clone());
            }
            tracing::info!(
                access_key_id = %creds.access_key_id,
                expires_at = ?creds.expires_at,
                "Refreshing credentials"
            );
        }

        let fresh = self.inner.credentials().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}
