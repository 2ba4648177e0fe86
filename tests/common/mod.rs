//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use trace_bridge::config::{BridgeConfig, EndpointConfig, Protocol};

pub const INBOUND_TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
pub const INBOUND_TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const INBOUND_SPAN_ID: &str = "00f067aa0ba902b7";

/// Loopback config for one test. Ports used: `base` (ingress),
/// `base + 1` (span relays), `base + 2` (downstream), `base + 3` (collector).
pub fn test_config(base: u16, downstream: Protocol) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.gateway.host = "127.0.0.1".into();
    config.gateway.bind_host = "127.0.0.1".into();
    config.gateway.http_port = base;
    config.gateway.http_span_port = base + 1;
    config.gateway.coap_span_port = base + 1;
    config.gateway.downstream_protocol = downstream;
    config.terminal.bind_host = "127.0.0.1".into();
    config.terminal.protocol = downstream;
    config.downstream = EndpointConfig::new("127.0.0.1", base + 2);
    config.collector = EndpointConfig::new("127.0.0.1", base + 3);
    config.timeouts.downstream_secs = 2;
    config.cpu_monitor.enabled = false;
    config
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Collector that forwards every span it receives, answering after `delay`.
pub async fn start_collector(addr: SocketAddr, delay: Duration) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route(
            "/span",
            post(move |State(tx): State<mpsc::UnboundedSender<Value>>, Json(span): Json<Value>| async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(span);
                Json(json!({ "status": "ok" }))
            }),
        )
        .with_state(tx);

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    rx
}

/// HTTP downstream that records request headers and bodies and answers with
/// `status` and `body`.
pub async fn start_http_downstream(
    addr: SocketAddr,
    status: StatusCode,
    body: &'static str,
) -> mpsc::UnboundedReceiver<(HeaderMap, Bytes)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .fallback(
            move |State(tx): State<mpsc::UnboundedSender<(HeaderMap, Bytes)>>,
                  headers: HeaderMap,
                  payload: Bytes| async move {
                let _ = tx.send((headers, payload));
                (status, body)
            },
        )
        .with_state(tx);

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    rx
}

/// Next span from `rx`, or `None` if nothing arrives within `wait`.
pub async fn next_span(rx: &mut mpsc::UnboundedReceiver<Value>, wait: Duration) -> Option<Value> {
    tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
}

/// Wait for listeners spawned by the test to come up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
