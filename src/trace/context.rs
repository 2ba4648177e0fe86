//! W3C trace-context codec.
//!
//! # Responsibilities
//! - Parse an inbound `traceparent` into trace-id, parent span-id and flags
//! - Render the canonical `{version}-{trace-id}-{span-id}-{flags}` header
//! - Mint random identifiers for roots and new hops
//!
//! # Design Decisions
//! - A malformed header is never an error for the caller: it degrades to a
//!   freshly minted, sampled root
//! - Identifiers are fixed-size byte arrays, so rendering is always
//!   zero-padded to full width

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use thiserror::Error;

/// Header carrying the version, trace-id, parent span-id and flags.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Opaque vendor header, forwarded untouched.
pub const TRACESTATE_HEADER: &str = "tracestate";

const SUPPORTED_VERSION: u8 = 0x00;
const FORBIDDEN_VERSION: u8 = 0xff;

/// Reasons a `traceparent` value is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceContextError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid version field")]
    Version,

    #[error("invalid trace-id field")]
    TraceId,

    #[error("invalid span-id field")]
    SpanId,

    #[error("invalid flags field")]
    Flags,
}

/// 16-byte trace identifier shared by every hop of one request chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// Mint a new random trace-id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn is_valid(&self) -> bool {
        self.0 != [0u8; 16]
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TraceId {
    type Err = TraceContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        decode_lower_hex(s, &mut bytes).ok_or(TraceContextError::TraceId)?;
        Ok(Self(bytes))
    }
}

/// 8-byte identifier of a single hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    /// Mint a new random span-id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn is_valid(&self) -> bool {
        self.0 != [0u8; 8]
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SpanId {
    type Err = TraceContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        decode_lower_hex(s, &mut bytes).ok_or(TraceContextError::SpanId)?;
        Ok(Self(bytes))
    }
}

/// The one-byte flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Only the exact value `01` counts as sampled.
    pub fn is_sampled(self) -> bool {
        self == Self::SAMPLED
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

impl FromStr for TraceFlags {
    type Err = TraceContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut byte = [0u8; 1];
        decode_lower_hex(s, &mut byte).ok_or(TraceContextError::Flags)?;
        Ok(Self(byte[0]))
    }
}

/// A decoded `traceparent` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub version: u8,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: TraceFlags,
}

impl TraceContext {
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            trace_id,
            span_id,
            flags,
        }
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{}",
            self.version, self.trace_id, self.span_id, self.flags
        )
    }
}

impl FromStr for TraceContext {
    type Err = TraceContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split('-').collect();
        if fields.len() != 4 {
            return Err(TraceContextError::FieldCount(fields.len()));
        }

        let mut version = [0u8; 1];
        decode_lower_hex(fields[0], &mut version).ok_or(TraceContextError::Version)?;
        if version[0] == FORBIDDEN_VERSION {
            return Err(TraceContextError::Version);
        }

        let trace_id: TraceId = fields[1].parse()?;
        if !trace_id.is_valid() {
            return Err(TraceContextError::TraceId);
        }

        let span_id: SpanId = fields[2].parse()?;
        if !span_id.is_valid() {
            return Err(TraceContextError::SpanId);
        }

        let flags: TraceFlags = fields[3].parse()?;

        Ok(Self {
            version: version[0],
            trace_id,
            span_id,
            flags,
        })
    }
}

/// What a hop learns from its inbound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundContext {
    pub trace_id: TraceId,
    /// The upstream hop's span-id; `None` when this hop is the trace root.
    pub parent_span_id: Option<SpanId>,
    pub flags: TraceFlags,
}

impl InboundContext {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

/// Extract trace-id, parent span-id and flags from an inbound header.
///
/// An absent or malformed header yields a new random trace-id, no parent and
/// the sampled flag.
pub fn parse(header: Option<&str>) -> InboundContext {
    let parsed = header.map(str::parse::<TraceContext>);

    match parsed {
        Some(Ok(ctx)) => InboundContext {
            trace_id: ctx.trace_id,
            parent_span_id: Some(ctx.span_id),
            flags: ctx.flags,
        },
        other => {
            if let Some(Err(e)) = other {
                tracing::debug!(error = %e, "Malformed traceparent, starting new trace");
            }
            InboundContext {
                trace_id: TraceId::random(),
                parent_span_id: None,
                flags: TraceFlags::SAMPLED,
            }
        }
    }
}

/// Render a version-00 `traceparent` value.
pub fn format(trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> String {
    TraceContext::new(trace_id, span_id, flags).to_string()
}

/// `n` random bytes as `2n` lowercase hex characters.
pub fn mint_id(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn decode_lower_hex(field: &str, out: &mut [u8]) -> Option<()> {
    if field.len() != out.len() * 2 {
        return None;
    }
    if !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    hex::decode_to_slice(field, out).ok()
}
