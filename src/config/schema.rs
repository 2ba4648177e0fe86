//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for both roles.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trace::options::{
    TraceOptionTable, DEFAULT_TRACEPARENT_OPTION, DEFAULT_TRACESTATE_OPTION,
};

/// Root configuration shared by the gateway and the terminal server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Gateway listeners and downstream protocol.
    pub gateway: GatewayConfig,

    /// Terminal server behaviour.
    pub terminal: TerminalConfig,

    /// Address of the downstream (terminal) server.
    pub downstream: EndpointConfig,

    /// Address of the tracing backend's span sink.
    pub collector: EndpointConfig,

    /// CoAP option numbers for the trace headers.
    pub coap: CoapOptionsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Process CPU self-monitoring.
    pub cpu_monitor: CpuMonitorConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            terminal: TerminalConfig::default(),
            downstream: EndpointConfig::new("127.0.0.1", 5683),
            collector: EndpointConfig::new("127.0.0.1", 3001),
            coap: CoapOptionsConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
            cpu_monitor: CpuMonitorConfig::default(),
        }
    }
}

/// Wire protocol spoken towards the downstream tier.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Coap,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Coap => f.write_str("coap"),
            Protocol::Http => f.write_str("http"),
        }
    }
}

/// Where a terminal server sends its spans.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    /// Straight to the tracing backend.
    #[default]
    Collector,
    /// Through the gateway's span relay.
    Gateway,
}

/// A host/port pair. Both fields are required when the section is present.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for socket connects and URI authorities.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL of the `/span` sink served at this endpoint.
    pub fn span_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&format!("http://{}/span", self.authority()))
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address other devices use to reach the gateway's span relays.
    pub host: String,

    /// Interface the gateway listeners bind to.
    pub bind_host: String,

    /// HTTP ingress port.
    pub http_port: u16,

    /// HTTP span relay port.
    pub http_span_port: u16,

    /// CoAP span relay port (UDP).
    pub coap_span_port: u16,

    /// Protocol used for the downstream hop.
    pub downstream_protocol: Protocol,

    /// Operation name on gateway spans.
    pub operation_name: String,

    /// Largest inbound request body forwarded downstream.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            bind_host: "0.0.0.0".to_string(),
            http_port: 3000,
            http_span_port: 3002,
            coap_span_port: 3002,
            downstream_protocol: Protocol::Coap,
            operation_name: "Gateway-HTTP".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    pub fn http_relay(&self) -> EndpointConfig {
        EndpointConfig::new(self.host.clone(), self.http_span_port)
    }

    pub fn coap_relay(&self) -> EndpointConfig {
        EndpointConfig::new(self.host.clone(), self.coap_span_port)
    }
}

/// Terminal server configuration. Its listen port is `downstream.port`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Protocol the terminal server speaks.
    pub protocol: Protocol,

    /// Interface the terminal listener binds to.
    pub bind_host: String,

    /// Operation name on terminal spans.
    pub operation_name: String,

    /// Fixed payload returned for every request.
    pub response_body: String,

    /// Span destination.
    pub report_to: ReportTarget,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Coap,
            bind_host: "0.0.0.0".to_string(),
            operation_name: "IoT-Server-A".to_string(),
            response_body: "Hello http client!".to_string(),
            report_to: ReportTarget::Collector,
        }
    }
}

/// Private CoAP option numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoapOptionsConfig {
    pub traceparent_option: u16,
    pub tracestate_option: u16,
}

impl Default for CoapOptionsConfig {
    fn default() -> Self {
        Self {
            traceparent_option: DEFAULT_TRACEPARENT_OPTION,
            tracestate_option: DEFAULT_TRACESTATE_OPTION,
        }
    }
}

impl CoapOptionsConfig {
    pub fn table(&self) -> TraceOptionTable {
        TraceOptionTable::new(self.traceparent_option, self.tracestate_option)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the downstream hop in seconds.
    pub downstream_secs: u64,

    /// Deadline for a whole inbound HTTP request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            downstream_secs: 10,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// CPU self-monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CpuMonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for CpuMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
        }
    }
}
