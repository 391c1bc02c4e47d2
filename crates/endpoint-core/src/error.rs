//! Error types for the endpoint runtime
//!
//! The variants map onto the protocol-level failure modes an exchange can
//! run into. Handler implementations return [`CoapError::Code`] to have the
//! endpoint answer with a specific response code; everything else surfaces
//! through request futures and delivery listeners.

use std::net::SocketAddr;
use thiserror::Error;

use rcoap_packet_core::{CoapPacket, Code, PacketError};
use rcoap_transport::TransportError;

/// A type alias for handling `Result`s with `CoapError`
pub type Result<T> = std::result::Result<T, CoapError>;

/// Errors that can occur in the endpoint runtime
#[derive(Error, Debug)]
pub enum CoapError {
    /// Retransmissions exhausted, or the separate-response window elapsed
    #[error("transaction timed out")]
    Timeout,

    /// Per-endpoint queue cap exceeded without force-admit
    #[error("too many requests queued for endpoint {0}")]
    TooManyRequestsForEndpoint(SocketAddr),

    /// The peer terminated an observation: RST, missing observe option, or
    /// a non-notification response to an observed token. Carries the packet
    /// that ended it; delivered to
    /// [`ObservationHandler::observation_terminated`](crate::ObservationHandler::observation_terminated)
    #[error("observation terminated by {remote}")]
    ObservationTerminated {
        remote: SocketAddr,
        packet: Box<CoapPacket>,
    },

    /// A handler asked for a protocol-level error response
    #[error("response code {code}")]
    Code {
        code: Code,
        payload: Option<String>,
    },

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed message or unsupported critical option
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted in the wrong server state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The endpoint was stopped while the operation was pending
    #[error("endpoint stopped")]
    Shutdown,
}

impl CoapError {
    /// Shorthand for a code-only handler error.
    pub fn code(code: Code) -> Self {
        CoapError::Code { code, payload: None }
    }

    /// Handler error carrying a diagnostic payload.
    pub fn code_with_payload(code: Code, payload: impl Into<String>) -> Self {
        CoapError::Code {
            code,
            payload: Some(payload.into()),
        }
    }
}

impl From<PacketError> for CoapError {
    fn from(err: PacketError) -> Self {
        CoapError::Protocol(err.to_string())
    }
}
