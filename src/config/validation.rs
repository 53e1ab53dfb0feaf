//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, queue sizes fit
//!   a semaphore)
//! - Check the control plane URL is usable as a base
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    match Url::parse(&config.upstream.control_plane_url) {
        Ok(url) => {
            if url.scheme() != "http" {
                errors.push(ValidationError::new(
                    "upstream.control_plane_url",
                    format!("unsupported scheme {:?}", url.scheme()),
                ));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("upstream.control_plane_url", "missing host"));
            }
            if url.query().is_some() || url.fragment().is_some() {
                errors.push(ValidationError::new(
                    "upstream.control_plane_url",
                    "must not carry a query or fragment",
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new("upstream.control_plane_url", e.to_string())),
    }

    if !config.upstream.url_prefix.starts_with('/') {
        errors.push(ValidationError::new("upstream.url_prefix", "must start with '/'"));
    }

    if config.upstream.response_header_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.response_header_timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.secret.path.is_empty() {
        errors.push(ValidationError::new("secret.path", "must not be empty"));
    }

    if config.api_queue.limit > 0 && config.api_queue.timeout_ms == 0 {
        errors.push(ValidationError::new(
            "api_queue.timeout_ms",
            "must be greater than 0 when the queue is enabled",
        ));
    }

    match config.api_queue.limit.checked_add(config.api_queue.queue_limit) {
        Some(total) if total <= Semaphore::MAX_PERMITS => {}
        _ => errors.push(ValidationError::new(
            "api_queue.queue_limit",
            format!(
                "limit + queue_limit must not exceed {}",
                Semaphore::MAX_PERMITS
            ),
        )),
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.upstream.control_plane_url = "https://rails?x=1".into();
        config.upstream.url_prefix = "gitlab".into();
        config.api_queue.limit = 5;
        config.api_queue.timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"upstream.control_plane_url"));
        assert!(fields.contains(&"upstream.url_prefix"));
        assert!(fields.contains(&"api_queue.timeout_ms"));
    }

    #[test]
    fn oversized_queue_is_rejected() {
        let mut config = ProxyConfig::default();
        config.api_queue.limit = Semaphore::MAX_PERMITS;
        config.api_queue.queue_limit = 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "api_queue.queue_limit");

        config.api_queue.limit = usize::MAX;
        assert!(validate_config(&config).is_err());

        config.api_queue.limit = 10;
        config.api_queue.queue_limit = 100;
        assert_eq!(validate_config(&config), Ok(()));
    }
}
