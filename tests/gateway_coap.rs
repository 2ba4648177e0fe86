//! Gateway with a CoAP downstream, end to end through the CoAP terminal.

use std::time::Duration;

use coap_lite::{RequestType, ResponseType};
use serde_json::Value;
use tokio::net::UdpSocket;
use trace_bridge::config::{Protocol, ReportTarget};
use trace_bridge::net::coap;
use trace_bridge::trace::{TraceContext, TraceOptionTable};
use trace_bridge::{BridgeConfig, Gateway, Shutdown, Terminal};

mod common;
use common::{addr, next_span, settle, test_config, INBOUND_SPAN_ID, INBOUND_TRACEPARENT, INBOUND_TRACE_ID};

async fn start_chain(config: &BridgeConfig) -> Shutdown {
    let shutdown = Shutdown::new();
    tokio::spawn(Terminal::new(config).unwrap().run(shutdown.clone()));
    tokio::spawn(Gateway::new(config).unwrap().run(shutdown.clone()));
    settle().await;
    shutdown
}

async fn two_spans(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Value>) -> (Value, Value) {
    let first = next_span(rx, Duration::from_secs(2)).await.expect("first span");
    let second = next_span(rx, Duration::from_secs(2)).await.expect("second span");
    if first["operationName"] == "Gateway-HTTP" {
        (first, second)
    } else {
        (second, first)
    }
}

#[tokio::test]
async fn terminal_span_is_child_of_gateway_span() {
    let base = 47300;
    let config = test_config(base, Protocol::Coap);
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = start_chain(&config).await;

    let res = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{base}/"))
        .header("traceparent", INBOUND_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "Hello http client!");

    let (gateway, terminal) = two_spans(&mut spans).await;
    assert_eq!(gateway["traceId"], INBOUND_TRACE_ID);
    assert_eq!(terminal["traceId"], INBOUND_TRACE_ID);
    assert_eq!(gateway["parentSpanId"], INBOUND_SPAN_ID);
    assert_eq!(terminal["parentSpanId"], gateway["spanId"]);
    assert_eq!(terminal["operationName"], "IoT-Server-A");
    assert_ne!(terminal["spanId"], gateway["spanId"]);

    shutdown.trigger();
}

#[tokio::test]
async fn terminal_can_report_through_coap_relay() {
    let base = 47310;
    let mut config = test_config(base, Protocol::Coap);
    config.terminal.report_to = ReportTarget::Gateway;
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = start_chain(&config).await;

    let res = reqwest::get(format!("http://127.0.0.1:{base}/")).await.unwrap();
    assert_eq!(res.status(), 200);

    let (gateway, terminal) = two_spans(&mut spans).await;
    assert!(gateway["parentSpanId"].is_null());
    assert_eq!(terminal["traceId"], gateway["traceId"]);
    assert_eq!(terminal["parentSpanId"], gateway["spanId"]);

    shutdown.trigger();
}

#[tokio::test]
async fn coap_request_carries_path_query_and_trace_options() {
    let base = 47320;
    let config = test_config(base, Protocol::Coap);
    let _spans = common::start_collector(addr(base + 3), Duration::ZERO).await;

    let downstream = UdpSocket::bind(addr(base + 2)).await.unwrap();
    let captured = tokio::spawn(async move {
        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        let (len, peer) = downstream.recv_from(&mut buf).await.unwrap();
        let request = coap::decode(&buf[..len]).unwrap();
        let reply = coap::response(&request, ResponseType::Content, b"21.5".to_vec());
        downstream.send_to(&coap::encode(&reply).unwrap(), peer).await.unwrap();
        request
    });

    let shutdown = Shutdown::new();
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .put(format!("http://127.0.0.1:{base}/sensors/temp?unit=c"))
        .header("traceparent", INBOUND_TRACEPARENT)
        .header("tracestate", "k1=v001,k2=v002")
        .body("set")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "21.5");

    let request = captured.await.unwrap();
    assert_eq!(coap::method(&request), Some(RequestType::Put));
    assert_eq!(coap::path(&request), "/sensors/temp");
    assert_eq!(request.payload, b"set");

    let trace = TraceOptionTable::default().decode(&request);
    assert_eq!(trace.tracestate.as_deref(), Some("k1=v001,k2=v002"));
    let outbound: TraceContext = trace.traceparent.unwrap().parse().unwrap();
    assert_eq!(outbound.trace_id.to_string(), INBOUND_TRACE_ID);
    assert_ne!(outbound.span_id.to_string(), INBOUND_SPAN_ID);

    shutdown.trigger();
}

#[tokio::test]
async fn coap_error_code_is_bad_gateway() {
    let base = 47330;
    let config = test_config(base, Protocol::Coap);
    let mut spans = common::start_collector(addr(base + 3), Duration::ZERO).await;

    let downstream = UdpSocket::bind(addr(base + 2)).await.unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        let (len, peer) = downstream.recv_from(&mut buf).await.unwrap();
        let request = coap::decode(&buf[..len]).unwrap();
        let reply = coap::response(&request, ResponseType::NotFound, Vec::new());
        downstream.send_to(&coap::encode(&reply).unwrap(), peer).await.unwrap();
    });

    let shutdown = Shutdown::new();
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{base}/missing"))
        .header("traceparent", INBOUND_TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert!(next_span(&mut spans, Duration::from_millis(500)).await.is_none());

    shutdown.trigger();
}

#[tokio::test]
async fn method_without_coap_equivalent_is_refused() {
    let base = 47340;
    let config = test_config(base, Protocol::Coap);
    let _spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let shutdown = start_chain(&config).await;

    let res = reqwest::Client::new()
        .patch(format!("http://127.0.0.1:{base}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);

    shutdown.trigger();
}

#[tokio::test]
async fn silent_coap_downstream_is_gateway_timeout() {
    let base = 47350;
    let mut config = test_config(base, Protocol::Coap);
    config.timeouts.downstream_secs = 1;
    let _silent = UdpSocket::bind(addr(base + 2)).await.unwrap();

    let shutdown = Shutdown::new();
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::get(format!("http://127.0.0.1:{base}/")).await.unwrap();
    assert_eq!(res.status(), 504);

    shutdown.trigger();
}

#[tokio::test]
async fn reply_larger_than_one_kilobyte_is_relayed_whole() {
    let base = 47360;
    let config = test_config(base, Protocol::Coap);
    let _spans = common::start_collector(addr(base + 3), Duration::ZERO).await;

    let downstream = UdpSocket::bind(addr(base + 2)).await.unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        let (len, peer) = downstream.recv_from(&mut buf).await.unwrap();
        let request = coap::decode(&buf[..len]).unwrap();
        let reply = coap::response(&request, ResponseType::Content, vec![b'r'; 1250]);
        downstream.send_to(&coap::encode(&reply).unwrap(), peer).await.unwrap();
    });

    let shutdown = Shutdown::new();
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::get(format!("http://127.0.0.1:{base}/readings")).await.unwrap();
    assert_eq!(res.status(), 200);
    let body = res.bytes().await.unwrap();
    assert_eq!(body.len(), 1250);
    assert!(body.iter().all(|b| *b == b'r'));

    shutdown.trigger();
}

#[tokio::test]
async fn body_too_large_for_one_message_is_refused() {
    let base = 47370;
    let config = test_config(base, Protocol::Coap);
    let _spans = common::start_collector(addr(base + 3), Duration::ZERO).await;
    let downstream = UdpSocket::bind(addr(base + 2)).await.unwrap();

    let shutdown = Shutdown::new();
    tokio::spawn(Gateway::new(&config).unwrap().run(shutdown.clone()));
    settle().await;

    let res = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{base}/upload"))
        .body(vec![0u8; coap::MAX_PAYLOAD + 1])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);

    let mut buf = vec![0u8; coap::MAX_DATAGRAM];
    let nothing =
        tokio::time::timeout(Duration::from_millis(200), downstream.recv_from(&mut buf)).await;
    assert!(nothing.is_err(), "nothing may reach the downstream");

    shutdown.trigger();
}
