//! Terminal role: the end of the call chain.
//!
//! Answers GET with a fixed body over HTTP or CoAP, records one span per
//! request and reports it once the response is on its way.

pub mod coap;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

use crate::config::{BridgeConfig, Protocol, ReportTarget};
use crate::error::ServiceError;
use crate::lifecycle::Shutdown;
use crate::net::{self, bind_tcp, bind_udp};
use crate::report::SpanReporter;
use crate::trace::Span;

/// What each request handler needs.
#[derive(Clone)]
pub struct Work {
    operation_name: Arc<str>,
    body: Bytes,
    reporter: SpanReporter,
}

impl Work {
    pub fn new(operation_name: &str, body: &str, reporter: SpanReporter) -> Self {
        Self {
            operation_name: Arc::from(operation_name),
            body: Bytes::copy_from_slice(body.as_bytes()),
            reporter,
        }
    }

    fn begin(&self, traceparent: Option<&str>) -> Span {
        Span::create(self.operation_name.as_ref(), traceparent)
    }
}

pub struct Terminal {
    config: BridgeConfig,
    work: Work,
}

impl Terminal {
    pub fn new(config: &BridgeConfig) -> Result<Self, ServiceError> {
        let terminal = &config.terminal;
        let reporter = match (terminal.report_to, terminal.protocol) {
            (ReportTarget::Collector, _) => {
                SpanReporter::http(config.collector.span_url().map_err(|source| {
                    ServiceError::Address {
                        what: "collector",
                        source,
                    }
                })?)
            }
            (ReportTarget::Gateway, Protocol::Http) => {
                SpanReporter::http(config.gateway.http_relay().span_url().map_err(|source| {
                    ServiceError::Address {
                        what: "span relay",
                        source,
                    }
                })?)
            }
            (ReportTarget::Gateway, Protocol::Coap) => {
                SpanReporter::coap(config.gateway.coap_relay().authority())
            }
        };

        Ok(Self {
            config: config.clone(),
            work: Work::new(&terminal.operation_name, &terminal.response_body, reporter),
        })
    }

    /// Listen on the downstream port until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServiceError> {
        let terminal = &self.config.terminal;
        let port = self.config.downstream.port;

        tracing::info!(
            protocol = %terminal.protocol,
            report_to = ?terminal.report_to,
            sink = self.work.reporter.sink().label(),
            "Terminal server starting"
        );

        match terminal.protocol {
            Protocol::Http => {
                let listener = bind_tcp(&terminal.bind_host, port, "terminal-http").await?;
                let timeout = Duration::from_secs(self.config.timeouts.request_secs);
                let app = http::router(self.work, timeout);
                axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(shutdown.notified())
                    .await?;
            }
            Protocol::Coap => {
                let socket = bind_udp(&terminal.bind_host, port, "terminal-coap").await?;
                let options = self.config.coap.table();
                let work = self.work;
                net::coap::serve(
                    socket,
                    move |packet, responder| coap::handle(work.clone(), options, packet, responder),
                    shutdown.subscribe(),
                )
                .await?;
            }
        }

        tracing::info!("Terminal server stopped");
        Ok(())
    }
}
