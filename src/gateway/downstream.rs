//! Outbound hop from the gateway to the downstream server.
//!
//! # Responsibilities
//! - Re-encode the trace context for the downstream protocol
//! - Forward method, path, headers and body
//! - Bound every call with the downstream deadline
//!
//! # Design Decisions
//! - Protocol is fixed by configuration, never negotiated
//! - No retries: one failed call fails one client request
//! - Timeouts map to 504, every other failure to 502

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::uri::Scheme;
use axum::http::{HeaderMap, HeaderName, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use coap_lite::{MessageType, RequestType};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time;

use crate::config::{BridgeConfig, Protocol};
use crate::http::response;
use crate::net::coap::{self, CoapError};
use crate::trace::{TraceHeaders, TraceOptionTable, TRACEPARENT_HEADER, TRACESTATE_HEADER};

const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Headers that describe the inbound connection rather than the request.
const HOP_HEADERS: [&str; 11] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("downstream request could not be built: {0}")]
    Build(String),

    #[error("downstream connection failed: {0}")]
    Connect(String),

    #[error("downstream responded with status {0}")]
    Status(StatusCode),

    #[error("downstream responded with CoAP code {0}")]
    CoapStatus(String),

    #[error("downstream response body unreadable: {0}")]
    Body(String),

    #[error("downstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("request body of {0} bytes does not fit in one CoAP message")]
    PayloadTooLarge(usize),

    #[error("method {0} has no CoAP equivalent")]
    UnsupportedMethod(Method),

    #[error(transparent)]
    Coap(#[from] CoapError),
}

impl DownstreamError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DownstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DownstreamError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            DownstreamError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DownstreamError {
    fn into_response(self) -> Response {
        let body = match self.status_code() {
            StatusCode::GATEWAY_TIMEOUT => "Downstream request timed out",
            StatusCode::METHOD_NOT_ALLOWED => "Method not supported downstream",
            StatusCode::PAYLOAD_TOO_LARGE => "Request body too large for CoAP",
            _ => "Downstream request failed",
        };
        response::plain_text(self.status_code(), body)
    }
}

/// One request to forward.
#[derive(Debug)]
pub struct DownstreamRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Trace headers for the next hop, already re-encoded.
    pub trace: TraceHeaders,
}

enum Transport {
    Http(HttpDownstream),
    Coap(CoapDownstream),
}

/// Client for the configured downstream server.
pub struct DownstreamClient {
    transport: Transport,
    timeout: Duration,
}

impl DownstreamClient {
    pub fn http(authority: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport: Transport::Http(HttpDownstream::new(authority.into())),
            timeout,
        }
    }

    pub fn coap(target: impl Into<String>, options: TraceOptionTable, timeout: Duration) -> Self {
        Self {
            transport: Transport::Coap(CoapDownstream {
                target: target.into(),
                options,
            }),
            timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let timeout = Duration::from_secs(config.timeouts.downstream_secs);
        let target = config.downstream.authority();
        match config.gateway.downstream_protocol {
            Protocol::Http => Self::http(target, timeout),
            Protocol::Coap => Self::coap(target, config.coap.table(), timeout),
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self.transport {
            Transport::Http(_) => "http",
            Transport::Coap(_) => "coap",
        }
    }

    /// Forward `request` and return the downstream payload.
    pub async fn send(&self, request: DownstreamRequest) -> Result<Bytes, DownstreamError> {
        let outcome = match &self.transport {
            Transport::Http(http) => time::timeout(self.timeout, http.send(request)).await,
            Transport::Coap(coap) => time::timeout(self.timeout, coap.send(request)).await,
        };
        outcome.map_err(|_| DownstreamError::Timeout(self.timeout))?
    }
}

struct HttpDownstream {
    authority: String,
    client: Client<HttpConnector, Body>,
}

impl HttpDownstream {
    fn new(authority: String) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { authority, client }
    }

    async fn send(&self, request: DownstreamRequest) -> Result<Bytes, DownstreamError> {
        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.as_str())
            .path_and_query(request.path_and_query.as_str())
            .build()
            .map_err(|e| DownstreamError::Build(e.to_string()))?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                if is_forwarded(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
            request.trace.apply_to_http(headers);
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| DownstreamError::Build(e.to_string()))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| DownstreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownstreamError::Status(status));
        }

        axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| DownstreamError::Body(e.to_string()))
    }
}

fn is_forwarded(name: &HeaderName) -> bool {
    let name = name.as_str();
    name != TRACEPARENT_HEADER && name != TRACESTATE_HEADER && !HOP_HEADERS.contains(&name)
}

struct CoapDownstream {
    target: String,
    options: TraceOptionTable,
}

impl CoapDownstream {
    async fn send(&self, request: DownstreamRequest) -> Result<Bytes, DownstreamError> {
        let method = coap_method(&request.method)?;
        if request.body.len() > coap::MAX_PAYLOAD {
            return Err(DownstreamError::PayloadTooLarge(request.body.len()));
        }
        let (path, query) = match request.path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (request.path_and_query.as_str(), None),
        };

        let mut packet = coap::request(method, MessageType::Confirmable, path, query);
        self.options.encode(&request.trace, &mut packet);
        packet.payload = request.body.to_vec();

        let local: SocketAddr = ([0, 0, 0, 0], 0).into();
        let socket = UdpSocket::bind(local).await.map_err(CoapError::Io)?;
        socket
            .connect(self.target.as_str())
            .await
            .map_err(CoapError::Io)?;

        let reply = coap::exchange(&socket, &packet).await?;
        if !coap::is_success(&reply.header.code) {
            return Err(DownstreamError::CoapStatus(format!("{:?}", reply.header.code)));
        }
        Ok(Bytes::from(reply.payload))
    }
}

fn coap_method(method: &Method) -> Result<RequestType, DownstreamError> {
    match *method {
        Method::GET => Ok(RequestType::Get),
        Method::POST => Ok(RequestType::Post),
        Method::PUT => Ok(RequestType::Put),
        Method::DELETE => Ok(RequestType::Delete),
        _ => Err(DownstreamError::UnsupportedMethod(method.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            DownstreamError::Timeout(Duration::from_secs(10)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            DownstreamError::Connect("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DownstreamError::Status(StatusCode::NOT_FOUND).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DownstreamError::UnsupportedMethod(Method::PATCH).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            DownstreamError::PayloadTooLarge(70_000).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            DownstreamError::Coap(CoapError::Truncated(coap::MAX_DATAGRAM)).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn trace_and_hop_headers_are_not_copied() {
        for name in ["traceparent", "tracestate", "host", "connection", "content-length"] {
            assert!(!is_forwarded(&HeaderName::from_static(name)), "{name}");
        }
        for name in ["accept", "x-request-id", "content-type"] {
            assert!(is_forwarded(&HeaderName::from_static(name)), "{name}");
        }
    }

    #[test]
    fn only_rest_verbs_map_to_coap() {
        assert_eq!(coap_method(&Method::GET).unwrap(), RequestType::Get);
        assert_eq!(coap_method(&Method::DELETE).unwrap(), RequestType::Delete);
        assert!(matches!(
            coap_method(&Method::OPTIONS),
            Err(DownstreamError::UnsupportedMethod(_))
        ));
    }

    #[tokio::test]
    async fn oversized_body_is_refused_before_sending() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = DownstreamClient::coap(
            peer.local_addr().unwrap().to_string(),
            TraceOptionTable::default(),
            Duration::from_secs(1),
        );

        let err = client
            .send(DownstreamRequest {
                method: Method::POST,
                path_and_query: "/data".into(),
                headers: HeaderMap::new(),
                body: Bytes::from(vec![0u8; coap::MAX_PAYLOAD + 1]),
                trace: TraceHeaders::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DownstreamError::PayloadTooLarge(_)));

        let mut buf = [0u8; 16];
        let nothing =
            tokio::time::timeout(Duration::from_millis(200), peer.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn silent_coap_peer_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = DownstreamClient::coap(
            silent.local_addr().unwrap().to_string(),
            TraceOptionTable::default(),
            Duration::from_millis(200),
        );

        let err = client
            .send(DownstreamRequest {
                method: Method::GET,
                path_and_query: "/".into(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
                trace: TraceHeaders::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DownstreamError::Timeout(_)));
    }
}
