//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (bind TCP for HTTP, UDP for CoAP)
//!
//! CoAP traffic:
//!     inbound datagram → coap.rs serve loop → one task per request → Responder
//!     outbound request → coap.rs exchange on a per-request socket
//! ```
//!
//! # Design Decisions
//! - Each listening socket is bound once and never reconfigured
//! - Outbound CoAP uses a fresh ephemeral socket per request, so concurrent
//!   handlers never share receive state

pub mod coap;
pub mod listener;

pub use listener::{bind_tcp, bind_udp, ListenerError};
