//! HTTP plumbing shared by the gateway and the HTTP terminal server.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request id, access log, deadline)
//!     → role-specific handler (gateway ingress, span relay, terminal)
//!     → response.rs (plain-text or JSON body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;

pub use request::{request_id, with_common_layers, UuidRequestId, X_REQUEST_ID};
