//! Gateway role.
//!
//! # Data Flow
//! ```text
//! HTTP client
//!     → ingress.rs (gateway span, re-encoded traceparent)
//!     → downstream.rs (HTTP or CoAP, bounded by the downstream deadline)
//!     → client response, then span report to the collector
//!
//! Terminal server span
//!     → relay.rs (HTTP or CoAP POST /span)
//!     → collector, verbatim
//! ```
//!
//! # Design Decisions
//! - The CoAP relay is bound only when the downstream tier speaks CoAP
//! - All listeners stop on the same shutdown broadcast

pub mod downstream;
pub mod ingress;
pub mod relay;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BridgeConfig, Protocol};
use crate::error::ServiceError;
use crate::lifecycle::Shutdown;
use crate::net::{bind_tcp, bind_udp, coap};
use crate::report::SpanReporter;

pub use downstream::{DownstreamClient, DownstreamError, DownstreamRequest};
pub use ingress::IngressState;

pub struct Gateway {
    config: BridgeConfig,
    downstream: Arc<DownstreamClient>,
    reporter: SpanReporter,
}

impl Gateway {
    pub fn new(config: &BridgeConfig) -> Result<Self, ServiceError> {
        let collector = config
            .collector
            .span_url()
            .map_err(|source| ServiceError::Address {
                what: "collector",
                source,
            })?;

        Ok(Self {
            config: config.clone(),
            downstream: Arc::new(DownstreamClient::from_config(config)),
            reporter: SpanReporter::http(collector),
        })
    }

    /// Bind every listener and serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServiceError> {
        let gateway = &self.config.gateway;
        let request_timeout = Duration::from_secs(self.config.timeouts.request_secs);

        let ingress_listener =
            bind_tcp(&gateway.bind_host, gateway.http_port, "gateway-ingress").await?;
        let relay_listener =
            bind_tcp(&gateway.bind_host, gateway.http_span_port, "span-relay-http").await?;
        let coap_relay_socket = match gateway.downstream_protocol {
            Protocol::Coap => Some(
                bind_udp(&gateway.bind_host, gateway.coap_span_port, "span-relay-coap").await?,
            ),
            Protocol::Http => None,
        };

        tracing::info!(
            downstream = %self.config.downstream.authority(),
            protocol = self.downstream.protocol(),
            collector = %self.config.collector.authority(),
            "Gateway starting"
        );

        let ingress = ingress::router(
            IngressState {
                downstream: Arc::clone(&self.downstream),
                reporter: self.reporter.clone(),
                operation_name: Arc::from(gateway.operation_name.as_str()),
                max_body_bytes: gateway.max_body_bytes,
            },
            request_timeout,
        );
        let relay = relay::http_router(self.reporter.clone(), request_timeout);

        let ingress_server = async {
            axum::serve(ingress_listener, ingress.into_make_service())
                .with_graceful_shutdown(shutdown.notified())
                .await
                .map_err(ServiceError::from)
        };
        let relay_server = async {
            axum::serve(relay_listener, relay.into_make_service())
                .with_graceful_shutdown(shutdown.notified())
                .await
                .map_err(ServiceError::from)
        };
        let coap_relay = async {
            let Some(socket) = coap_relay_socket else {
                return Ok(());
            };
            let reporter = self.reporter.clone();
            coap::serve(
                socket,
                move |packet, responder| relay::handle_coap(reporter.clone(), packet, responder),
                shutdown.subscribe(),
            )
            .await
            .map_err(ServiceError::from)
        };

        tokio::try_join!(ingress_server, relay_server, coap_relay)?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
