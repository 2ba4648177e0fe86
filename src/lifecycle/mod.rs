//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Bind listeners → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → HTTP graceful shutdown, UDP loops exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - In-flight span reports are not awaited on exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
