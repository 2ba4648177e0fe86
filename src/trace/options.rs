//! Trace headers and their CoAP option encoding.
//!
//! CoAP has no header namespace, so `traceparent` and `tracestate` travel as
//! two private option numbers. Both ends must be built from the same
//! [`TraceOptionTable`] or the values are silently dropped.

use axum::http::{HeaderMap, HeaderValue};
use coap_lite::{CoapOption, Packet};

use super::context::{TRACEPARENT_HEADER, TRACESTATE_HEADER};

pub const DEFAULT_TRACEPARENT_OPTION: u16 = 2076;
pub const DEFAULT_TRACESTATE_OPTION: u16 = 2104;

/// The two trace headers as carried between hops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceHeaders {
    pub traceparent: Option<String>,
    pub tracestate: Option<String>,
}

impl TraceHeaders {
    pub fn from_http(headers: &HeaderMap) -> Self {
        Self {
            traceparent: header_string(headers, TRACEPARENT_HEADER),
            tracestate: header_string(headers, TRACESTATE_HEADER),
        }
    }

    /// Set both headers on `headers`, replacing any existing values.
    pub fn apply_to_http(&self, headers: &mut HeaderMap) {
        for (name, value) in [
            (TRACEPARENT_HEADER, &self.traceparent),
            (TRACESTATE_HEADER, &self.tracestate),
        ] {
            headers.remove(name);
            let Some(value) = value else { continue };
            match HeaderValue::from_bytes(value.as_bytes()) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(_) => tracing::debug!(header = name, "Dropping unencodable trace header"),
            }
        }
    }
}

/// Only visible-ASCII values are carried; anything else is dropped.
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(v) => Some(v.to_string()),
        Err(_) => {
            tracing::debug!(header = name, "Dropping non-ASCII trace header");
            None
        }
    }
}

/// Fixed mapping from the trace headers to private CoAP option numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptionTable {
    traceparent: u16,
    tracestate: u16,
}

impl Default for TraceOptionTable {
    fn default() -> Self {
        Self::new(DEFAULT_TRACEPARENT_OPTION, DEFAULT_TRACESTATE_OPTION)
    }
}

impl TraceOptionTable {
    pub fn new(traceparent: u16, tracestate: u16) -> Self {
        Self {
            traceparent,
            tracestate,
        }
    }

    pub fn traceparent(&self) -> u16 {
        self.traceparent
    }

    pub fn tracestate(&self) -> u16 {
        self.tracestate
    }

    /// Attach whichever headers are present as options.
    pub fn encode(&self, headers: &TraceHeaders, packet: &mut Packet) {
        if let Some(value) = &headers.traceparent {
            packet.add_option(CoapOption::Unknown(self.traceparent), value.as_bytes().to_vec());
        }
        if let Some(value) = &headers.tracestate {
            packet.add_option(CoapOption::Unknown(self.tracestate), value.as_bytes().to_vec());
        }
    }

    pub fn decode(&self, packet: &Packet) -> TraceHeaders {
        TraceHeaders {
            traceparent: read_option(packet, self.traceparent),
            tracestate: read_option(packet, self.tracestate),
        }
    }
}

fn read_option(packet: &Packet, number: u16) -> Option<String> {
    packet
        .get_option(CoapOption::Unknown(number))
        .and_then(|values| values.front())
        .and_then(|value| String::from_utf8(value.clone()).ok())
}
