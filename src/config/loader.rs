//! Configuration loading from disk and the command line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::cli::Cli;
use crate::config::schema::{ProxyConfig, RawConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Places searched for a config file when none is named explicitly.
pub const CONFIG_SEARCH_PATH: [&str; 2] = ["/etc/aws-signing-proxy.toml", "aws-signing-proxy.toml"];

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("could not decode config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read one config file.
pub fn load_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Read the explicitly named config file, or the first file found on the
/// search path. Absence is only an error for an explicitly named file.
pub fn discover_file(explicit: Option<&Path>) -> Result<Option<(PathBuf, RawConfig)>, ConfigError> {
    if let Some(path) = explicit {
        return load_file(path).map(|raw| Some((path.to_owned(), raw)));
    }

    for candidate in CONFIG_SEARCH_PATH.iter().map(Path::new) {
        if candidate.is_file() {
            return load_file(candidate).map(|raw| Some((candidate.to_owned(), raw)));
        }
    }
    Ok(None)
}

/// Merge the file layer under the command-line layer and validate.
pub fn resolve(cli: &Cli, file: RawConfig) -> Result<ProxyConfig, ConfigError> {
    let merged = file.layered_under(cli.to_raw());
    validate_config(&merged).map_err(ConfigError::Validation)
}

/// Build the proxy configuration: flags and their environment variables,
/// then the config file, then built-in defaults.
pub fn load_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let file = match discover_file(cli.config.as_deref())? {
        Some((path, raw)) => {
            tracing::info!(path = %path.display(), "Loaded config file");
            raw
        }
        None => RawConfig::default(),
    };
    resolve(cli, file)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn flags_override_file_and_file_overrides_defaults() {
        let file = write_config(
            r#"
            target = "https://from-file.example.com"
            region = "eu-central-1"
            dial-timeout = 5
            "#,
        );
        let cli = Cli {
            target: Some("https://from-flag.example.com".into()),
            config: Some(file.path().to_owned()),
            ..Default::default()
        };

        let config = load_config(&cli).unwrap();
        assert_eq!(config.target.to_string(), "https://from-flag.example.com");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.transport.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/aws-signing-proxy.toml")),
            ..Default::default()
        };
        assert!(matches!(load_config(&cli), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("port = \"not a number\"");
        assert!(matches!(
            load_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validation_errors_are_joined() {
        let cli = Cli {
            port: Some(0),
            ..Default::default()
        };
        let err = resolve(&cli, RawConfig::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no proxy target set; use --target, AWS_ES_TARGET or the config file, port must be non-zero"
        );
    }
}
