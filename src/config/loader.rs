//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::InterceptorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable selecting the listen port.
pub const PORT_ENV_VAR: &str = "API_INTERCEPTOR_PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a configuration file without validating it.
pub fn read_config_file(path: &Path) -> Result<InterceptorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply the port environment variable. Values that are not a valid port are
/// ignored with a warning, leaving the current port in place.
pub fn apply_port_env(config: &mut InterceptorConfig, value: Option<&str>) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().parse::<u16>() {
        Ok(port) => config.listener.port = port,
        Err(_) => tracing::warn!(
            variable = PORT_ENV_VAR,
            value = %raw,
            "Ignoring invalid port from environment"
        ),
    }
}

/// Build the effective configuration.
///
/// Precedence, lowest to highest: defaults, config file, environment, CLI flag.
pub fn load_config(
    path: Option<&Path>,
    port_flag: Option<u16>,
) -> Result<InterceptorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => InterceptorConfig::default(),
    };

    apply_port_env(&mut config, std::env::var(PORT_ENV_VAR).ok().as_deref());

    if let Some(port) = port_flag {
        config.listener.port = port;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
