//! CoAP terminal server.

use coap_lite::{Packet, RequestType, ResponseType};

use super::Work;
use crate::net::coap::{self, Responder};
use crate::trace::TraceOptionTable;

/// Answer one request. Only GET is served; anything else gets 4.05.
pub async fn handle(work: Work, options: TraceOptionTable, packet: Packet, responder: Responder) {
    if coap::method(&packet) != Some(RequestType::Get) {
        let reply = coap::response(&packet, ResponseType::MethodNotAllowed, Vec::new());
        if let Err(e) = responder.send(&reply).await {
            tracing::warn!(peer = %responder.peer(), error = %e, "Failed to send CoAP reply");
        }
        return;
    }

    let trace = options.decode(&packet);
    let span = work.begin(trace.traceparent.as_deref());

    tracing::debug!(
        peer = %responder.peer(),
        path = %coap::path(&packet),
        trace_id = %span.trace_id(),
        span_id = %span.span_id(),
        tracestate = trace.tracestate.as_deref().unwrap_or(""),
        "Serving request"
    );

    let reply = coap::response(&packet, ResponseType::Content, work.body.to_vec());
    if let Err(e) = responder.send(&reply).await {
        tracing::warn!(peer = %responder.peer(), error = %e, "Failed to send CoAP reply");
    }
    work.reporter.finish(span);
}
