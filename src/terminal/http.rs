//! HTTP terminal server.

use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use super::Work;
use crate::http::{self as http_layers, response};
use crate::trace::TraceHeaders;

/// GET on any path. Other methods get 405 from the method router.
pub fn router(work: Work, request_timeout: Duration) -> Router {
    let router = Router::new()
        .route("/{*path}", get(handle))
        .route("/", get(handle))
        .with_state(work);
    http_layers::with_common_layers(router, request_timeout)
}

async fn handle(State(work): State<Work>, headers: HeaderMap) -> Response {
    let trace = TraceHeaders::from_http(&headers);
    let span = work.begin(trace.traceparent.as_deref());

    tracing::debug!(
        trace_id = %span.trace_id(),
        span_id = %span.span_id(),
        tracestate = trace.tracestate.as_deref().unwrap_or(""),
        "Serving request"
    );

    let response = response::plain_text(StatusCode::OK, work.body.clone());
    work.reporter.finish(span);
    response
}
