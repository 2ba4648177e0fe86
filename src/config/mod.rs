//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (SERVER_IP, HTTP_PORT, ...)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → cloned into each component at construction
//! ```
//!
//! # Design Decisions
//! - Config is resolved once at startup and never reloaded
//! - All fields have defaults to allow minimal configs
//! - Any error is fatal: the process never starts half-configured

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BridgeConfig, CoapOptionsConfig, CpuMonitorConfig, EndpointConfig, GatewayConfig,
    ObservabilityConfig, Protocol, ReportTarget, TerminalConfig, TimeoutConfig,
};
pub use validation::ValidationError;
