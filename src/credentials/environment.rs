//! Credentials from process environment variables.

use async_trait::async_trait;

use crate::credentials::{CredentialError, CredentialProvider, Credentials};

const NAME: &str = "environment";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `AWS_ACCESS_KEY_ID` (or `AWS_ACCESS_KEY`), `AWS_SECRET_ACCESS_KEY`
/// (or `AWS_SECRET_KEY`) and an optional `AWS_SESSION_TOKEN`.
pub struct EnvironmentProvider {
    lookup: Lookup,
}

impl EnvironmentProvider {
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Use a custom variable source instead of the process environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| (self.lookup)(key))
            .find(|value| !value.is_empty())
    }
}

impl Default for EnvironmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let access_key_id = self
            .first_of(&["AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY"])
            .ok_or_else(|| CredentialError::NotFound {
                provider: NAME,
                reason: "AWS_ACCESS_KEY_ID not set".into(),
            })?;
        let secret_access_key = self
            .first_of(&["AWS_SECRET_ACCESS_KEY", "AWS_SECRET_KEY"])
            .ok_or_else(|| CredentialError::NotFound {
                provider: NAME,
                reason: "AWS_SECRET_ACCESS_KEY not set".into(),
            })?;

        let mut creds = Credentials::new(access_key_id, secret_access_key);
        creds.session_token = self.first_of(&["AWS_SESSION_TOKEN"]);
        Ok(creds)
    }
}
