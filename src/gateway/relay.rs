//! Span relays: forward spans from terminal servers to the tracing backend.
//!
//! Both relays accept `POST /span` with a JSON span body. The body is
//! checked against the span wire shape and then forwarded byte for byte.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Response,
    routing::post,
    Router,
};
use coap_lite::{MessageType, Packet, RequestType, ResponseType};
use serde_json::json;

use crate::http::{self, response};
use crate::net::coap::{self, Responder};
use crate::observability::metrics;
use crate::report::SpanReporter;
use crate::trace::SpanRecord;

pub const SPAN_PATH: &str = "/span";

#[derive(Clone)]
struct RelayState {
    reporter: SpanReporter,
}

/// Router for the HTTP span relay.
pub fn http_router(reporter: SpanReporter, request_timeout: Duration) -> Router {
    let router = Router::new()
        .route(SPAN_PATH, post(relay_http).fallback(not_found))
        .fallback(not_found)
        .with_state(RelayState { reporter });
    http::with_common_layers(router, request_timeout)
}

/// Parse `payload` as a span record.
pub fn validate(payload: &[u8]) -> Result<SpanRecord, serde_json::Error> {
    serde_json::from_slice(payload)
}

async fn relay_http(State(state): State<RelayState>, body: Bytes) -> Response {
    match validate(&body) {
        Ok(record) => {
            tracing::debug!(
                trace_id = %record.trace_id,
                span_id = %record.span_id,
                operation = %record.operation_name,
                "Relaying span"
            );
            metrics::record_span_relay("http", "accepted");
            state.reporter.dispatch(body.to_vec());
            response::json(StatusCode::OK, json!({ "status": "ok" }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting span payload");
            metrics::record_span_relay("http", "rejected");
            response::json(StatusCode::BAD_REQUEST, json!({ "error": "Invalid JSON" }))
        }
    }
}

async fn not_found() -> Response {
    response::json(StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
}

/// Handle one datagram on the CoAP span relay.
///
/// Confirmable requests get 2.04 on success, 4.00 for a bad body and 4.04
/// for anything other than `POST /span`. Non-confirmable requests get no
/// reply.
pub async fn handle_coap(reporter: SpanReporter, packet: Packet, responder: Responder) {
    let is_span_post =
        coap::method(&packet) == Some(RequestType::Post) && coap::path(&packet) == SPAN_PATH;

    let code = if !is_span_post {
        ResponseType::NotFound
    } else {
        match validate(&packet.payload) {
            Ok(record) => {
                tracing::debug!(
                    peer = %responder.peer(),
                    trace_id = %record.trace_id,
                    span_id = %record.span_id,
                    operation = %record.operation_name,
                    "Relaying span"
                );
                metrics::record_span_relay("coap", "accepted");
                reporter.dispatch(packet.payload.clone());
                ResponseType::Changed
            }
            Err(e) => {
                tracing::warn!(peer = %responder.peer(), error = %e, "Rejecting span payload");
                metrics::record_span_relay("coap", "rejected");
                ResponseType::BadRequest
            }
        }
    };

    if packet.header.get_type() == MessageType::Confirmable {
        let reply = coap::response(&packet, code, Vec::new());
        if let Err(e) = responder.send(&reply).await {
            tracing::warn!(peer = %responder.peer(), error = %e, "Failed to answer span relay request");
        }
    }
}
