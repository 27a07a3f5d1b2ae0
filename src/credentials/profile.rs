//! Credentials from the shared credentials file (`~/.aws/credentials`).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::credentials::{CredentialError, CredentialProvider, Credentials};

const NAME: &str = "shared credentials file";
const DEFAULT_PROFILE: &str = "default";

/// Reads one profile from an INI-style credentials file.
#[derive(Debug, Clone)]
pub struct ProfileFileProvider {
    path: Option<PathBuf>,
    profile: String,
}

impl ProfileFileProvider {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            profile: profile.into(),
        }
    }

    /// Location from `AWS_SHARED_CREDENTIALS_FILE` or `$HOME/.aws/credentials`,
    /// profile from `AWS_PROFILE` or `default`.
    pub fn from_env() -> Self {
        let path = std::env::var_os("AWS_SHARED_CREDENTIALS_FILE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME")
                    .or_else(|| std::env::var_os("USERPROFILE"))
                    .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
            });
        let profile = std::env::var("AWS_PROFILE")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_owned());

        Self { path, profile }
    }
}

#[async_trait]
impl CredentialProvider for ProfileFileProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let path = self.path.as_ref().ok_or_else(|| CredentialError::NotFound {
            provider: NAME,
            reason: "no home directory to look in".into(),
        })?;

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound {
                    provider: NAME,
                    reason: format!("{} does not exist", path.display()),
                });
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        parse_profile(&contents, &self.profile)
    }
}

/// Extract one profile's credentials from credentials-file contents.
pub fn parse_profile(contents: &str, profile: &str) -> Result<Credentials, CredentialError> {
    let mut in_profile = false;
    let mut found = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            let section = section.strip_prefix("profile ").map_or(section, str::trim);
            in_profile = section == profile;
            found |= in_profile;
            continue;
        }

        if !in_profile {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_owned();
        match key.trim().to_ascii_lowercase().as_str() {
            "aws_access_key_id" => access_key_id = Some(value),
            "aws_secret_access_key" => secret_access_key = Some(value),
            "aws_session_token" => session_token = Some(value),
            _ => {}
        }
    }

    if !found {
        return Err(CredentialError::NotFound {
            provider: NAME,
            reason: format!("profile {profile:?} not found"),
        });
    }

    match (access_key_id, secret_access_key) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
            let mut creds = Credentials::new(id, secret);
            creds.session_token = session_token.filter(|t| !t.is_empty());
            Ok(creds)
        }
        _ => Err(CredentialError::Malformed {
            provider: NAME,
            reason: format!("profile {profile:?} lacks aws_access_key_id or aws_secret_access_key"),
        }),
    }
}
