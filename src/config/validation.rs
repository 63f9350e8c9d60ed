//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, capacities > 0)
//! - Validate tunnel tool settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InterceptorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::InterceptorConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a loaded configuration.
pub fn validate_config(config: &InterceptorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_host", "must not be empty"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.probe_secs == 0 {
        errors.push(ValidationError::new("timeouts.probe_secs", "must be greater than 0"));
    }
    if config.health.interval_secs == 0 {
        errors.push(ValidationError::new("health.interval_secs", "must be greater than 0"));
    }
    if config.capture.queue_capacity == 0 {
        errors.push(ValidationError::new("capture.queue_capacity", "must be greater than 0"));
    }
    if config.observers.keepalive_secs == 0 {
        errors.push(ValidationError::new("observers.keepalive_secs", "must be greater than 0"));
    }
    if config.observers.write_timeout_secs == 0 {
        errors.push(ValidationError::new("observers.write_timeout_secs", "must be greater than 0"));
    }

    if config.tunnel.enabled {
        if config.tunnel.binary.trim().is_empty() {
            errors.push(ValidationError::new("tunnel.binary", "must not be empty"));
        }
        if config.tunnel.share_domain.trim().is_empty() {
            errors.push(ValidationError::new("tunnel.share_domain", "must not be empty"));
        }
        if config.tunnel.url_timeout_secs == 0 {
            errors.push(ValidationError::new("tunnel.url_timeout_secs", "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
