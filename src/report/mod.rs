//! Span reporting.
//!
//! # Data Flow
//! ```text
//! handler finishes its hop
//!     → SpanReporter::finish (complete span, sampling gate)
//!     → tokio::spawn (detached, no handle kept)
//!     → SpanSink::send
//!         → HTTP POST /span to the collector or the gateway relay
//!         → CoAP NON POST /span to the gateway relay
//! ```
//!
//! # Design Decisions
//! - At-most-once: no retry, no buffering, no batching
//! - Failures are logged and counted, never surfaced to the request path
//! - Callers never await delivery

use std::net::SocketAddr;
use std::sync::Arc;

use coap_lite::{ContentFormat, MessageType, RequestType};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::net::UdpSocket;
use url::Url;

use crate::net::coap::{self, CoapError};
use crate::observability::metrics;
use crate::trace::Span;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("span report request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("collector rejected span: {0}")]
    Status(#[source] reqwest::Error),

    #[error("collector response was not JSON: {0}")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("span could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Coap(#[from] CoapError),
}

/// Destination of span payloads.
#[derive(Debug)]
pub enum SpanSink {
    /// `POST /span` over HTTP.
    Http { client: reqwest::Client, url: Url },
    /// Non-confirmable `POST /span` over CoAP.
    Coap { target: String },
}

impl SpanSink {
    pub fn label(&self) -> &'static str {
        match self {
            SpanSink::Http { .. } => "http",
            SpanSink::Coap { .. } => "coap",
        }
    }

    /// Deliver one JSON payload.
    pub async fn send(&self, body: Vec<u8>) -> Result<(), ReportError> {
        match self {
            SpanSink::Http { client, url } => {
                let response = client
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await
                    .map_err(ReportError::Request)?
                    .error_for_status()
                    .map_err(ReportError::Status)?;
                // The collector acknowledges with a JSON body.
                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(ReportError::InvalidResponse)?;
                Ok(())
            }
            SpanSink::Coap { target } => {
                let mut packet =
                    coap::request(RequestType::Post, MessageType::NonConfirmable, "/span", None);
                packet.set_content_format(ContentFormat::ApplicationJSON);
                packet.payload = body;

                let local: SocketAddr = ([0, 0, 0, 0], 0).into();
                let socket = UdpSocket::bind(local).await.map_err(CoapError::Io)?;
                socket
                    .send_to(&coap::encode(&packet)?, target.as_str())
                    .await
                    .map_err(CoapError::Io)?;
                Ok(())
            }
        }
    }
}

/// Cheap-to-clone handle that reports spans in the background.
#[derive(Debug, Clone)]
pub struct SpanReporter {
    sink: Arc<SpanSink>,
}

impl SpanReporter {
    pub fn new(sink: SpanSink) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Report over HTTP to `url` (a collector or the gateway's HTTP relay).
    pub fn http(url: Url) -> Self {
        Self::new(SpanSink::Http {
            client: reqwest::Client::new(),
            url,
        })
    }

    /// Report over CoAP to the gateway's CoAP relay at `target` (`host:port`).
    pub fn coap(target: impl Into<String>) -> Self {
        Self::new(SpanSink::Coap {
            target: target.into(),
        })
    }

    pub fn sink(&self) -> &SpanSink {
        &self.sink
    }

    /// Complete `span` and, if it is sampled, report it without waiting.
    pub fn finish(&self, mut span: Span) {
        span.complete();
        if !span.is_sampled() {
            tracing::trace!(trace_id = %span.trace_id(), "Span not sampled, dropping");
            metrics::record_span_report("unsampled");
            return;
        }

        match serde_json::to_vec(&span.to_wire()) {
            Ok(body) => {
                tracing::debug!(
                    trace_id = %span.trace_id(),
                    span_id = %span.span_id(),
                    operation = span.operation_name(),
                    "Reporting span"
                );
                self.dispatch(body);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize span");
                metrics::record_span_report("failed");
            }
        }
    }

    /// Send an already-encoded span payload without waiting.
    pub fn dispatch(&self, body: Vec<u8>) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.send(body).await {
                Ok(()) => metrics::record_span_report("sent"),
                Err(e) => {
                    tracing::warn!(sink = sink.label(), error = %e, "Span report failed");
                    metrics::record_span_report("failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn coap_sink_sends_json_post() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reporter = SpanReporter::coap(relay.local_addr().unwrap().to_string());

        let span = Span::create("IoT-Server-A", None);
        let span_id = span.span_id().to_string();
        reporter.finish(span);

        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), relay.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let packet = coap::decode(&buf[..len]).unwrap();

        assert_eq!(coap::method(&packet), Some(RequestType::Post));
        assert_eq!(coap::path(&packet), "/span");
        assert_eq!(packet.header.get_type(), MessageType::NonConfirmable);
        let json: serde_json::Value = serde_json::from_slice(&packet.payload).unwrap();
        assert_eq!(json["spanId"], span_id.as_str());
        assert!(json["endTime"].is_u64());
    }

    #[tokio::test]
    async fn unsampled_span_is_not_sent() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reporter = SpanReporter::coap(relay.local_addr().unwrap().to_string());

        reporter.finish(Span::create(
            "Gateway-HTTP",
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00"),
        ));

        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        let received =
            tokio::time::timeout(Duration::from_millis(300), relay.recv_from(&mut buf)).await;
        assert!(received.is_err(), "unsampled span must not be reported");
    }

    #[tokio::test]
    async fn unreachable_collector_is_swallowed() {
        let url = Url::parse("http://127.0.0.1:9/span").unwrap();
        let sink = SpanSink::Http {
            client: reqwest::Client::new(),
            url,
        };
        assert!(matches!(
            sink.send(b"{}".to_vec()).await,
            Err(ReportError::Request(_))
        ));

        // The background path only logs.
        SpanReporter::new(sink).dispatch(b"{}".to_vec());
    }
}
