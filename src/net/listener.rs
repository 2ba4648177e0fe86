//! Socket binding for the bridge's listeners.
//!
//! # Responsibilities
//! - Bind each configured address exactly once at startup
//! - Resolve host names before binding
//! - Report bind failures with the offending address

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, UdpSocket};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The address did not resolve.
    #[error("Failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let authority = format!("{host}:{port}");
    let mut addrs = lookup_host(authority.clone())
        .await
        .map_err(|source| ListenerError::Resolve {
            addr: authority.clone(),
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::Resolve {
        addr: authority,
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
    })
}

/// Bind a TCP listener for an HTTP server.
pub async fn bind_tcp(host: &str, port: u16, role: &'static str) -> Result<TcpListener, ListenerError> {
    let addr = resolve(host, port).await?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    tracing::info!(
        role = role,
        address = %listener.local_addr().unwrap_or(addr),
        transport = "tcp",
        "Listener bound"
    );
    Ok(listener)
}

/// Bind a UDP socket for a CoAP server.
pub async fn bind_udp(host: &str, port: u16, role: &'static str) -> Result<UdpSocket, ListenerError> {
    let addr = resolve(host, port).await?;
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    tracing::info!(
        role = role,
        address = %socket.local_addr().unwrap_or(addr),
        transport = "udp",
        "Listener bound"
    );
    Ok(socket)
}
