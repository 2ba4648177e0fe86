//! Trace-context subsystem.
//!
//! # Data Flow
//! ```text
//! inbound traceparent (HTTP header or CoAP option)
//!     → context.rs (parse, or mint a sampled root)
//!     → span.rs (fresh span-id, start time)
//!     → span.traceparent() re-encoded for the next hop
//!         → HTTP header, or options.rs (private CoAP option numbers)
//!     → span.complete() → to_wire() → reporter
//! ```
//!
//! # Design Decisions
//! - The trace-id never changes along a call chain; the span-id changes at
//!   every hop
//! - Each span is owned by exactly one handler, so nothing here is shared
//! - The option table is an immutable value handed to each CoAP component

pub mod context;
pub mod options;
pub mod span;

pub use context::{
    format, mint_id, parse, InboundContext, SpanId, TraceContext, TraceFlags, TraceId,
    TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
pub use options::{TraceHeaders, TraceOptionTable};
pub use span::{Span, SpanRecord};
