//! HTTP ingress: the client-facing side of the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

use crate::gateway::downstream::{DownstreamClient, DownstreamRequest};
use crate::http::{self, response};
use crate::observability::metrics;
use crate::report::SpanReporter;
use crate::trace::{Span, TraceHeaders};

/// State injected into the bridge handler.
#[derive(Clone)]
pub struct IngressState {
    pub downstream: Arc<DownstreamClient>,
    pub reporter: SpanReporter,
    pub operation_name: Arc<str>,
    pub max_body_bytes: usize,
}

/// Every method on every path goes to the same handler.
pub fn router(state: IngressState, request_timeout: Duration) -> Router {
    let router = Router::new()
        .route("/{*path}", any(bridge_handler))
        .route("/", any(bridge_handler))
        .with_state(state);
    http::with_common_layers(router, request_timeout)
}

/// Open the gateway span, forward the request with the re-encoded context,
/// answer the client, then report the span.
async fn bridge_handler(State(state): State<IngressState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = http::request_id(&request);
    let protocol = state.downstream.protocol();
    let (parts, body) = request.into_parts();

    let inbound = TraceHeaders::from_http(&parts.headers);
    let span = Span::create(state.operation_name.as_ref(), inbound.traceparent.as_deref());
    let outbound = TraceHeaders {
        traceparent: Some(span.traceparent()),
        tracestate: inbound.tracestate,
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        trace_id = %span.trace_id(),
        span_id = %span.span_id(),
        root = span.parent_span_id().is_none(),
        "Bridging request"
    );

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Unreadable request body");
            metrics::record_request(protocol, StatusCode::PAYLOAD_TOO_LARGE.as_u16(), start);
            return response::plain_text(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let call = DownstreamRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
        trace: outbound,
    };

    match state.downstream.send(call).await {
        Ok(payload) => {
            metrics::record_request(protocol, StatusCode::OK.as_u16(), start);
            state.reporter.finish(span);
            response::plain_text(StatusCode::OK, payload)
        }
        Err(e) => {
            let status = e.status_code();
            tracing::error!(
                request_id = %request_id,
                trace_id = %span.trace_id(),
                protocol,
                error = %e,
                "Downstream request failed"
            );
            metrics::record_request(protocol, status.as_u16(), start);
            e.into_response()
        }
    }
}
