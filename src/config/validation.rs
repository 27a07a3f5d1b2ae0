//! Configuration validation.
//!
//! Turns a merged [`RawConfig`] into a [`ProxyConfig`], filling defaults.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::{
    ProxyConfig, RawConfig, TargetEndpoint, TargetError, TransportConfig, DEFAULT_DIAL_KEEP_ALIVE_SECS,
    DEFAULT_DIAL_TIMEOUT_SECS, DEFAULT_IDLE_CONN_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_REGION,
};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no proxy target set; use --target, AWS_ES_TARGET or the config file")]
    MissingTarget,

    #[error("invalid target {url:?}: {source}")]
    InvalidTarget { url: String, source: TargetError },

    #[error("region must not be empty")]
    EmptyRegion,

    #[error("port must be non-zero")]
    ZeroPort,

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Validate a merged configuration and apply defaults.
pub fn validate_config(raw: &RawConfig) -> Result<ProxyConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let target = match raw.target.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push(ValidationError::MissingTarget);
            None
        }
        Some(url) => match TargetEndpoint::parse(url) {
            Ok(target) => Some(target),
            Err(source) => {
                errors.push(ValidationError::InvalidTarget {
                    url: url.to_owned(),
                    source,
                });
                None
            }
        },
    };

    let region = raw
        .region
        .as_deref()
        .unwrap_or(DEFAULT_REGION)
        .trim()
        .to_owned();
    if region.is_empty() {
        errors.push(ValidationError::EmptyRegion);
    }

    let port = raw.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    let metrics_address = match raw.metrics_address.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(addr) => match addr.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                errors.push(ValidationError::InvalidMetricsAddress(addr.to_owned()));
                None
            }
        },
    };

    let Some(target) = target else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ProxyConfig {
        target,
        listen_address: raw.listen_address.clone().unwrap_or_default(),
        port,
        region,
        flush_interval: Duration::from_secs(raw.flush_interval.unwrap_or(0)),
        transport: TransportConfig {
            dial_timeout: Duration::from_secs(raw.dial_timeout.unwrap_or(DEFAULT_DIAL_TIMEOUT_SECS)),
            dial_keep_alive: Duration::from_secs(
                raw.dial_keep_alive.unwrap_or(DEFAULT_DIAL_KEEP_ALIVE_SECS),
            ),
            idle_conn_timeout: Duration::from_secs(
                raw.idle_conn_timeout.unwrap_or(DEFAULT_IDLE_CONN_TIMEOUT_SECS),
            ),
        },
        strict_signing: raw.strict_signing.unwrap_or(true),
        metrics_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_target(target: &str) -> RawConfig {
        RawConfig {
            target: Some(target.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_applied() {
        let config = validate_config(&with_target("https://search.example.com")).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.flush_interval, Duration::ZERO);
        assert_eq!(config.transport.idle_conn_timeout, Duration::from_secs(90));
        assert_eq!(config.transport.dial_timeout, Duration::from_secs(30));
        assert_eq!(config.transport.dial_keep_alive, Duration::from_secs(30));
        assert!(config.strict_signing);
        assert!(config.metrics_address.is_none());
    }

    #[test]
    fn missing_target_is_rejected() {
        let errors = validate_config(&RawConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingTarget]);

        let errors = validate_config(&with_target("   ")).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingTarget]);
    }

    #[test]
    fn every_problem_is_reported() {
        let raw = RawConfig {
            target: Some("not a url".into()),
            region: Some(" ".into()),
            port: Some(0),
            metrics_address: Some("nowhere".into()),
            ..Default::default()
        };
        let errors = validate_config(&raw).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], ValidationError::InvalidTarget { .. }));
        assert_eq!(errors[1], ValidationError::EmptyRegion);
        assert_eq!(errors[2], ValidationError::ZeroPort);
        assert_eq!(
            errors[3],
            ValidationError::InvalidMetricsAddress("nowhere".into())
        );
    }

    #[test]
    fn zero_durations_are_kept() {
        let raw = RawConfig {
            idle_conn_timeout: Some(0),
            flush_interval: Some(0),
            ..with_target("http://localhost:9200")
        };
        let config = validate_config(&raw).unwrap();
        assert_eq!(config.transport.idle_conn_timeout, Duration::ZERO);
        assert_eq!(config.flush_interval, Duration::ZERO);
    }
}
