//! Minimal CoAP message exchange over UDP.
//!
//! # Responsibilities
//! - Build request packets from an HTTP-style method and path
//! - Run one request/response exchange on a connected socket
//! - Serve inbound datagrams, one task per request
//!
//! # Design Decisions
//! - Message encoding is delegated to `coap-lite`
//! - No retransmission: the caller's deadline bounds a lost exchange
//! - Both piggybacked and separate responses are accepted

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

/// Receive buffer size. Covers the largest UDP payload, so a datagram that
/// fills it was cut short by the socket.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Largest payload sent in a single message. The rest of the encoder's
/// message limit is left for the header, token and options.
pub const MAX_PAYLOAD: usize = Packet::MAX_SIZE - 1024;

#[derive(Debug, Error)]
pub enum CoapError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CoAP message: {0}")]
    Malformed(String),

    #[error("CoAP encoding failed: {0}")]
    Encode(String),

    #[error("peer reset the exchange")]
    Reset,

    #[error("datagram truncated at {0} bytes")]
    Truncated(usize),
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CoapError> {
    packet
        .to_bytes()
        .map_err(|e| CoapError::Encode(format!("{e:?}")))
}

pub fn decode(bytes: &[u8]) -> Result<Packet, CoapError> {
    Packet::from_bytes(bytes).map_err(|e| CoapError::Malformed(format!("{e:?}")))
}

/// A request with a random message id and 4-byte token.
pub fn request(method: RequestType, kind: MessageType, path: &str, query: Option<&str>) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(kind);
    packet.header.code = MessageClass::Request(method);
    packet.header.message_id = rand::random();
    packet.set_token(rand::random::<[u8; 4]>().to_vec());

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
    }
    if let Some(query) = query {
        for pair in query.split('&').filter(|s| !s.is_empty()) {
            packet.add_option(CoapOption::UriQuery, pair.as_bytes().to_vec());
        }
    }
    packet
}

/// Method of a request packet, `None` for responses and empty messages.
pub fn method(packet: &Packet) -> Option<RequestType> {
    match &packet.header.code {
        MessageClass::Request(method) => Some(method.clone()),
        _ => None,
    }
}

/// `/`-joined Uri-Path options.
pub fn path(packet: &Packet) -> String {
    let segments = packet
        .get_option(CoapOption::UriPath)
        .map(|values| {
            values
                .iter()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    format!("/{}", segments.join("/"))
}

/// True for 2.xx response codes.
pub fn is_success(code: &MessageClass) -> bool {
    matches!(
        code,
        MessageClass::Response(
            ResponseType::Created
                | ResponseType::Deleted
                | ResponseType::Valid
                | ResponseType::Changed
                | ResponseType::Content
                | ResponseType::Continue
        )
    )
}

/// The response to `request`: a piggybacked ACK for confirmable requests,
/// a non-confirmable message otherwise.
pub fn response(request: &Packet, code: ResponseType, payload: Vec<u8>) -> Packet {
    let mut packet = Packet::new();
    if request.header.get_type() == MessageType::Confirmable {
        packet.header.set_type(MessageType::Acknowledgement);
        packet.header.message_id = request.header.message_id;
    } else {
        packet.header.set_type(MessageType::NonConfirmable);
        packet.header.message_id = rand::random();
    }
    packet.header.code = MessageClass::Response(code);
    packet.set_token(request.get_token().to_vec());
    packet.payload = payload;
    packet
}

fn empty_ack(message_id: u16) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Acknowledgement);
    packet.header.code = MessageClass::Empty;
    packet.header.message_id = message_id;
    packet
}

/// Reject a datagram that filled the whole receive buffer.
pub fn ensure_whole(len: usize, capacity: usize) -> Result<(), CoapError> {
    if len >= capacity {
        return Err(CoapError::Truncated(len));
    }
    Ok(())
}

/// Send `request` on a connected socket and wait for its response.
pub async fn exchange(socket: &UdpSocket, request: &Packet) -> Result<Packet, CoapError> {
    socket.send(&encode(request)?).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let len = socket.recv(&mut buf).await?;
        ensure_whole(len, buf.len())?;
        let reply = match decode(&buf[..len]) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable datagram");
                continue;
            }
        };

        let same_exchange = reply.header.message_id == request.header.message_id;
        let same_token = reply.get_token() == request.get_token();

        match reply.header.get_type() {
            MessageType::Reset if same_exchange => return Err(CoapError::Reset),
            MessageType::Acknowledgement if same_exchange => {
                if reply.header.code == MessageClass::Empty {
                    // Separate response follows.
                    continue;
                }
                if same_token {
                    return Ok(reply);
                }
            }
            MessageType::Confirmable if same_token => {
                socket.send(&encode(&empty_ack(reply.header.message_id))?).await?;
                return Ok(reply);
            }
            MessageType::NonConfirmable if same_token => return Ok(reply),
            _ => {}
        }
        tracing::trace!(message_id = reply.header.message_id, "Ignoring unrelated CoAP message");
    }
}

/// Handle for replying to the peer of one inbound datagram.
#[derive(Clone)]
pub struct Responder {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl Responder {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&self, packet: &Packet) -> Result<(), CoapError> {
        self.socket.send_to(&encode(packet)?, self.peer).await?;
        Ok(())
    }
}

/// Receive datagrams until shutdown, spawning `handler` for each request.
pub async fn serve<H, Fut>(
    socket: UdpSocket,
    handler: H,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), CoapError>
where
    H: Fn(Packet, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let socket = Arc::new(socket);
    let handler = Arc::new(handler);
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "CoAP receive failed");
                        continue;
                    }
                };
                if let Err(e) = ensure_whole(len, buf.len()) {
                    tracing::debug!(peer = %peer, error = %e, "Dropping oversized datagram");
                    continue;
                }
                let packet = match decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "Dropping malformed datagram");
                        continue;
                    }
                };
                if method(&packet).is_none() {
                    continue;
                }

                let responder = Responder { socket: Arc::clone(&socket), peer };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler(packet, responder).await });
            }
            _ = shutdown.recv() => {
                tracing::info!("CoAP listener received shutdown signal");
                break;
            }
        }
    }
    Ok(())
}
