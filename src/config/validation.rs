//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that the CoAP option numbers can be told apart
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BridgeConfig, EndpointConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} host is required")]
    MissingHost(&'static str),

    #[error("{0} must be a valid port number")]
    InvalidPort(&'static str),

    #[error("{var} must be a valid port number, got {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("CoAP trace option numbers must be non-zero")]
    ZeroOption,

    #[error("CoAP option {0} is assigned to both traceparent and tracestate")]
    DuplicateOption(u16),

    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("cpu_monitor.interval_ms must be greater than zero")]
    ZeroInterval,

    #[error("metrics address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_endpoint(&config.downstream, "downstream", &mut errors);
    check_endpoint(&config.collector, "collector", &mut errors);

    if config.gateway.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost("gateway"));
    }
    if config.gateway.bind_host.trim().is_empty() {
        errors.push(ValidationError::MissingHost("gateway.bind_host"));
    }
    if config.terminal.bind_host.trim().is_empty() {
        errors.push(ValidationError::MissingHost("terminal.bind_host"));
    }
    for (port, name) in [
        (config.gateway.http_port, "gateway.http_port"),
        (config.gateway.http_span_port, "gateway.http_span_port"),
        (config.gateway.coap_span_port, "gateway.coap_span_port"),
    ] {
        if port == 0 {
            errors.push(ValidationError::InvalidPort(name));
        }
    }

    let coap = &config.coap;
    if coap.traceparent_option == 0 || coap.tracestate_option == 0 {
        errors.push(ValidationError::ZeroOption);
    } else if coap.traceparent_option == coap.tracestate_option {
        errors.push(ValidationError::DuplicateOption(coap.traceparent_option));
    }

    if config.timeouts.downstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("downstream"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request"));
    }
    if config.cpu_monitor.enabled && config.cpu_monitor.interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(endpoint: &EndpointConfig, name: &'static str, errors: &mut Vec<ValidationError>) {
    if endpoint.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost(name));
    }
    if endpoint.port == 0 {
        errors.push(ValidationError::InvalidPort(name));
    }
}
