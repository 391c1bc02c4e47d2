//! The decoded CoAP message value
//!
//! A [`CoapPacket`] is immutable after construction as far as the endpoint
//! core is concerned: the dispatcher and the transaction machinery only read
//! it, clone it for retransmission, and build fresh packets for responses.

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

use crate::code::{Code, MessageType, Method};
use crate::error::{PacketError, Result};
use crate::options::HeaderOptions;

/// Maximum token length RFC 7252 allows.
pub const MAX_TOKEN_LEN: usize = 8;

/// A decoded CoAP message.
///
/// Exactly one of `method` (requests) and `code` (responses) is set; both
/// absent means an empty message (ping, empty ACK, RST).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapPacket {
    message_type: MessageType,
    method: Option<Method>,
    code: Option<Code>,
    message_id: u16,
    token: Bytes,
    remote: SocketAddr,
    options: HeaderOptions,
    payload: Bytes,
}

impl CoapPacket {
    /// An empty confirmable message addressed to `remote`.
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            message_type: MessageType::Confirmable,
            method: None,
            code: None,
            message_id: 0,
            token: Bytes::new(),
            remote,
            options: HeaderOptions::default(),
            payload: Bytes::new(),
        }
    }

    /// A request with the given method and Uri-Path.
    pub fn request(remote: SocketAddr, method: Method, uri_path: impl Into<String>) -> Self {
        let mut packet = Self::new(remote);
        packet.method = Some(method);
        packet.options.uri_path = Some(uri_path.into());
        packet
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.message_type = message_type;
    }

    /// True when this message must be acknowledged by the peer.
    pub fn must_acknowledge(&self) -> bool {
        self.message_type == MessageType::Confirmable
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn set_method(&mut self, method: Option<Method>) {
        self.method = method;
    }

    pub fn code(&self) -> Option<Code> {
        self.code
    }

    pub fn set_code(&mut self, code: Option<Code>) {
        self.code = code;
    }

    /// True for an empty message: no method and no response code.
    pub fn is_empty_message(&self) -> bool {
        self.method.is_none() && self.code.is_none()
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn set_message_id(&mut self, message_id: u16) {
        self.message_id = message_id;
    }

    pub fn token(&self) -> &Bytes {
        &self.token
    }

    /// Replaces the token. Tokens longer than 8 bytes are rejected.
    pub fn set_token(&mut self, token: Bytes) -> Result<()> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(PacketError::TokenTooLong(token.len()));
        }
        self.token = token;
        Ok(())
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Rewrites the remote address. On the inbound path this is the sender's
    /// address, set by whatever decoded the datagram.
    pub fn set_remote(&mut self, remote: SocketAddr) {
        self.remote = remote;
    }

    pub fn headers(&self) -> &HeaderOptions {
        &self.options
    }

    pub fn headers_mut(&mut self) -> &mut HeaderOptions {
        &mut self.options
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Payload interpreted as UTF-8, lossily.
    pub fn payload_string(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Builds an empty acknowledgement skeleton for this message.
    ///
    /// Equivalent to `create_response(None)`.
    pub fn create_response(&self) -> Option<CoapPacket> {
        self.create_response_with_code(None)
    }

    /// Builds a response skeleton mirroring this message's correlation data.
    ///
    /// For a confirmable message the response is a piggyback ACK carrying the
    /// same message id; for a non-confirmable message it is a NON whose
    /// message id the sender assigns later. The token is echoed only when a
    /// code is present — empty messages must not carry one. Returns `None`
    /// when this message is itself an ACK or RST and cannot be responded to.
    pub fn create_response_with_code(&self, code: Option<Code>) -> Option<CoapPacket> {
        let message_type = match self.message_type {
            MessageType::Confirmable => MessageType::Acknowledgement,
            MessageType::NonConfirmable => MessageType::NonConfirmable,
            MessageType::Acknowledgement | MessageType::Reset => return None,
        };

        let mut response = CoapPacket::new(self.remote);
        response.message_type = message_type;
        response.code = code;
        if message_type == MessageType::Acknowledgement {
            response.message_id = self.message_id;
        }
        if code.is_some() {
            response.token = self.token.clone();
        }
        Some(response)
    }
}

impl fmt::Display for CoapPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MID:{}", self.message_type, self.message_id)?;
        if let Some(method) = self.method {
            write!(f, " {}", method)?;
        }
        if let Some(code) = self.code {
            write!(f, " {}", code)?;
        }
        if let Some(path) = &self.options.uri_path {
            write!(f, " {}", path)?;
        }
        if !self.token.is_empty() {
            write!(f, " Token:{:02x?}", &self.token[..])?;
        }
        if !self.payload.is_empty() {
            write!(f, " pl({})", self.payload.len())?;
        }
        Ok(())
    }
}
