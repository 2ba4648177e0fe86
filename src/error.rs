//! Errors that stop a gateway or terminal server.
//!
//! Request-level failures never reach this type; they are answered on the
//! connection that caused them.

use thiserror::Error;

use crate::net::coap::CoapError;
use crate::net::ListenerError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("HTTP server failed: {0}")]
    Serve(#[from] std::io::Error),

    #[error("CoAP server failed: {0}")]
    Coap(#[from] CoapError),

    #[error("invalid {what} address: {source}")]
    Address {
        what: &'static str,
        #[source]
        source: url::ParseError,
    },
}
