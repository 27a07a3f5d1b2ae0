//! Credentials from a remote role endpoint.
//!
//! Containers get theirs from the endpoint named by
//! `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` / `AWS_CONTAINER_CREDENTIALS_FULL_URI`.
//! Everything else asks the instance metadata service, using a session token
//! when the service hands one out.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::credentials::{CredentialError, CredentialProvider, Credentials};

const NAME: &str = "remote role";
const CONTAINER_ENDPOINT: &str = "http://169.254.170.2";
const INSTANCE_ENDPOINT: &str = "http://169.254.169.254";
const TOKEN_PATH: &str = "/latest/api/token";
const ROLE_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Where role credentials are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSource {
    /// A single URL returning the credential document.
    Container {
        url: String,
        authorization: Option<String>,
    },
    /// Instance metadata service rooted at `endpoint`.
    Instance { endpoint: String },
}

/// Credential document served by both container and instance endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

impl RoleCredentials {
    fn into_credentials(self) -> Result<Credentials, CredentialError> {
        if let Some(code) = self.code.filter(|c| c != "Success") {
            return Err(CredentialError::Malformed {
                provider: NAME,
                reason: format!("{code}: {}", self.message.unwrap_or_default()),
            });
        }

        match (self.access_key_id, self.secret_access_key) {
            (Some(id), Some(secret)) => Ok(Credentials {
                access_key_id: id,
                secret_access_key: secret,
                session_token: self.token.filter(|t| !t.is_empty()),
                expires_at: self.expiration,
            }),
            _ => Err(CredentialError::Malformed {
                provider: NAME,
                reason: "document lacks AccessKeyId or SecretAccessKey".into(),
            }),
        }
    }
}

/// Fetches temporary role credentials over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteRoleProvider {
    client: reqwest::Client,
    source: RoleSource,
}

impl RemoteRoleProvider {
    pub fn new(source: RoleSource) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|source| CredentialError::Remote {
                url: String::new(),
                source,
            })?;
        Ok(Self { client, source })
    }

    /// Pick the container endpoint when the container variables are set,
    /// the instance metadata service otherwise.
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::new(source_from(|key| std::env::var(key).ok()))
    }

    pub fn source(&self) -> &RoleSource {
        &self.source
    }

    async fn fetch_container(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<Credentials, CredentialError> {
        let mut request = self.client.get(url);
        if let Some(auth) = authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        let document: RoleCredentials = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| remote_error(url, source))?
            .json()
            .await
            .map_err(|source| remote_error(url, source))?;
        document.into_credentials()
    }

    async fn fetch_instance(&self, endpoint: &str) -> Result<Credentials, CredentialError> {
        let token = self.session_token(endpoint).await;

        let roles_url = format!("{endpoint}{ROLE_PATH}");
        let roles = self
            .metadata_get(&roles_url, token.as_deref())
            .await?
            .text()
            .await
            .map_err(|source| remote_error(&roles_url, source))?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| CredentialError::NotFound {
                provider: NAME,
                reason: "instance has no role attached".into(),
            })?;

        let document_url = format!("{roles_url}{role}");
        let document: RoleCredentials = self
            .metadata_get(&document_url, token.as_deref())
            .await?
            .json()
            .await
            .map_err(|source| remote_error(&document_url, source))?;
        document.into_credentials()
    }

    /// Ask for a metadata session token; services that do not issue tokens
    /// are used without one.
    async fn session_token(&self, endpoint: &str) -> Option<String> {
        let url = format!("{endpoint}{TOKEN_PATH}");
        let response = self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match response {
            Ok(response) => response.text().await.ok().filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::debug!(error = %e, "Metadata session token unavailable; continuing without one");
                None
            }
        }
    }

    async fn metadata_get(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<reqwest::Response, CredentialError> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| remote_error(url, source))
    }
}

#[async_trait]
impl CredentialProvider for RemoteRoleProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        match &self.source {
            RoleSource::Container { url, authorization } => {
                self.fetch_container(url, authorization.as_deref()).await
            }
            RoleSource::Instance { endpoint } => self.fetch_instance(endpoint).await,
        }
    }
}

fn remote_error(url: &str, source: reqwest::Error) -> CredentialError {
    CredentialError::Remote {
        url: url.to_owned(),
        source,
    }
}

/// Resolve the role endpoint from environment variables.
pub fn source_from(lookup: impl Fn(&str) -> Option<String>) -> RoleSource {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let authorization = get("AWS_CONTAINER_AUTHORIZATION_TOKEN");

    if let Some(relative) = get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
        return RoleSource::Container {
            url: format!("{CONTAINER_ENDPOINT}{relative}"),
            authorization,
        };
    }
    if let Some(url) = get("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
        return RoleSource::Container { url, authorization };
    }

    let endpoint = get("AWS_EC2_METADATA_SERVICE_ENDPOINT")
        .map(|e| e.trim_end_matches('/').to_owned())
        .unwrap_or_else(|| INSTANCE_ENDPOINT.to_owned());
    RoleSource::Instance { endpoint }
}
