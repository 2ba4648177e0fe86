//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! cpu.rs samples the process itself and feeds both.
//!
//! Consumers:
//!     → stdout (plain or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The spans this bridge measures are its own wire format, not `tracing`
//!   spans; `tracing` is only the process log
//! - Metrics are cheap and no-ops until a recorder is installed

pub mod cpu;
pub mod logging;
pub mod metrics;
