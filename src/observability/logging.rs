//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Choose human-readable or JSON output
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Default directives when `RUST_LOG` is not set.
pub fn default_directives(level: &str) -> String {
    format!("trace_bridge={level},trace_probe={level},tower_http={level}")
}

/// Install the global subscriber. Call once, before any listener starts.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
