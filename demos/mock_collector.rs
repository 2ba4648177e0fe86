//! Stand-in tracing backend.
//!
//! Accepts `POST /span`, prints each span and acknowledges it.
//!
//! ```text
//! cargo run --example mock-collector -- 127.0.0.1:3001
//! ```

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3001".to_string())
        .parse()?;

    let app = Router::new().route("/span", post(collect));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Mock collector listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn collect(Json(span): Json<Value>) -> (StatusCode, Json<Value>) {
    tracing::info!(
        trace_id = %span["traceId"],
        span_id = %span["spanId"],
        parent = %span["parentSpanId"],
        operation = %span["operationName"],
        "Span received"
    );
    println!("{}", serde_json::to_string_pretty(&span).unwrap_or_default());
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
