//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

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

/// Load the configuration file (if any), apply environment overrides and
/// validate the result.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<BridgeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => BridgeConfig::default(),
    };

    let mut errors = apply_env_overrides(&mut config, env);
    if let Err(mut semantic) = validate_config(&config) {
        errors.append(&mut semantic);
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Validation(errors))
    }
}

/// Apply the host/port variables used by the lab deployment scripts.
fn apply_env_overrides<F>(config: &mut BridgeConfig, env: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    if let Some(host) = env("SERVER_IP") {
        config.downstream.host = host;
    }
    if let Some(host) = env("TRACING_BACKEND_IP") {
        config.collector.host = host;
    }
    if let Some(host) = env("GATEWAY_IP") {
        config.gateway.host = host;
    }

    let ports: [(&'static str, &mut u16); 5] = [
        ("SERVER_PORT", &mut config.downstream.port),
        ("TRACING_BACKEND_PORT", &mut config.collector.port),
        ("HTTP_PORT", &mut config.gateway.http_port),
        ("HTTP_SPAN_PORT", &mut config.gateway.http_span_port),
        ("COAP_SPAN_PORT", &mut config.gateway.coap_span_port),
    ];
    for (var, slot) in ports {
        let Some(value) = env(var) else { continue };
        match value.trim().parse::<u16>() {
            Ok(port) if port > 0 => *slot = port,
            _ => errors.push(ValidationError::InvalidEnv { var, value }),
        }
    }

    errors
}
