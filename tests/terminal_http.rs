//! HTTP terminal server, alone and behind the gateway.

use std::time::Duration;

use trace_bridge::config::{Protocol, ReportTarget};
use trace_bridge::{Gateway, Shutdown, Terminal};

mod common;
use common::{addr, next_span, settle, test_config, INBOUND_SPAN_ID, INBOUND_TRACEPARENT, INBOUND_TRACE_ID};

#[tokio::test]
async fn get_is_answered_and_reported() {
    let base = 47400;
    let config = test_config(base, Protocol::Http);
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = Shutdown::new();
    tokio::spawn(Terminal::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/any/path", base + 2))
        .header("traceparent", INBOUND_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(res.text().await.unwrap(), "Hello http client!");

    let span = next_span(&mut spans, Duration::from_secs(2)).await.expect("span reported");
    assert_eq!(span["traceId"], INBOUND_TRACE_ID);
    assert_eq!(span["parentSpanId"], INBOUND_SPAN_ID);
    assert_eq!(span["operationName"], "IoT-Server-A");
    assert_eq!(span["flag"], "01");

    shutdown.trigger();
}

#[tokio::test]
async fn only_get_is_served() {
    let base = 47410;
    let config = test_config(base, Protocol::Http);
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = Shutdown::new();
    tokio::spawn(Terminal::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/", base + 2))
        .header("traceparent", INBOUND_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);
    assert!(next_span(&mut spans, Duration::from_millis(300)).await.is_none());

    shutdown.trigger();
}

#[tokio::test]
async fn terminal_reports_through_gateway_http_relay() {
    let base = 47420;
    let mut config = test_config(base, Protocol::Http);
    config.terminal.report_to = ReportTarget::Gateway;
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = Shutdown::new();
    tokio::spawn(Terminal::new(&config).unwrap().run(shutdown.clone()));
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{base}/"))
        .header("traceparent", INBOUND_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "Hello http client!");

    let first = next_span(&mut spans, Duration::from_secs(2)).await.expect("first span");
    let second = next_span(&mut spans, Duration::from_secs(2)).await.expect("second span");
    let (gateway, terminal) = if first["operationName"] == "Gateway-HTTP" {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(gateway["parentSpanId"], INBOUND_SPAN_ID);
    assert_eq!(terminal["parentSpanId"], gateway["spanId"]);
    assert_eq!(terminal["traceId"], INBOUND_TRACE_ID);

    shutdown.trigger();
}
