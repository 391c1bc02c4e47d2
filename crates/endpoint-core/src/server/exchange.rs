//! Per-request exchange
//!
//! A [`CoapExchange`] is what a handler sees: the decoded request, the
//! transport context it arrived on, and a response skeleton already carrying
//! the right correlation data (message id for a piggyback ACK, token, remote).
//! The handler mutates the response in place; after the handler returns, the
//! dispatcher sends whatever is left on the exchange and records it in the
//! duplicate detector. Handlers must not retain the exchange.

use bytes::Bytes;
use std::net::SocketAddr;

use rcoap_packet_core::{CoapPacket, Code, HeaderOptions, MessageType, Method};
use rcoap_transport::TransportContext;

use crate::error::Result;

pub struct CoapExchange {
    request: CoapPacket,
    request_context: TransportContext,
    response: Option<CoapPacket>,
    response_context: TransportContext,
}

impl CoapExchange {
    /// Exchange for an inbound request; the response skeleton defaults to
    /// 2.05 Content.
    pub(crate) fn for_request(request: CoapPacket, context: TransportContext) -> Self {
        let response = request.create_response_with_code(Some(Code::Content));
        Self {
            request,
            response_context: context.clone(),
            request_context: context,
            response,
        }
    }

    /// Exchange for an inbound observe notification; confirmable
    /// notifications are pre-armed with an empty ACK, non-confirmable ones
    /// with nothing.
    pub(crate) fn for_notification(packet: CoapPacket, context: TransportContext) -> Self {
        let response = if packet.must_acknowledge() {
            packet.create_response()
        } else {
            None
        };
        Self {
            request: packet,
            response_context: context.clone(),
            request_context: context,
            response,
        }
    }

    pub fn request(&self) -> &CoapPacket {
        &self.request
    }

    pub fn remote(&self) -> SocketAddr {
        self.request.remote()
    }

    pub fn method(&self) -> Option<Method> {
        self.request.method()
    }

    pub fn request_context(&self) -> &TransportContext {
        &self.request_context
    }

    /// Replaces the whole response packet.
    pub fn set_response(&mut self, response: CoapPacket) {
        self.response = Some(response);
    }

    /// Suppresses the response; nothing is sent for this exchange.
    pub fn set_no_response(&mut self) {
        self.response = None;
    }

    pub fn set_response_code(&mut self, code: Code) {
        if let Some(response) = self.response_mut() {
            response.set_code(Some(code));
        }
    }

    pub fn set_response_payload(&mut self, payload: impl Into<Bytes>) {
        if let Some(response) = self.response_mut() {
            response.set_payload(payload);
        }
    }

    pub fn set_response_token(&mut self, token: Bytes) -> Result<()> {
        if let Some(response) = self.response_mut() {
            response.set_token(token)?;
        }
        Ok(())
    }

    /// Turns the response into an empty RST for the request.
    pub fn set_reset_response(&mut self) {
        if let Some(mut reset) = self.request.create_response() {
            reset.set_message_type(MessageType::Reset);
            self.response = Some(reset);
        }
    }

    /// Response option set, or `None` when this message cannot be responded
    /// to at all.
    pub fn response_headers_mut(&mut self) -> Option<&mut HeaderOptions> {
        self.response_mut().map(CoapPacket::headers_mut)
    }

    /// Sets code and payload in one go.
    pub fn respond(&mut self, code: Code, payload: impl Into<Bytes>) {
        if let Some(response) = self.response_mut() {
            response.set_code(Some(code));
            response.set_payload(payload);
        }
    }

    /// Context the response will be sent with; defaults to the request's.
    pub fn set_response_context(&mut self, context: TransportContext) {
        self.response_context = context;
    }

    /// Lazily re-arms the response skeleton. `None` when the inbound message
    /// is itself an ACK or RST and cannot be responded to (a stray ACK
    /// delivered through the notification path); mutations are dropped
    /// silently in that case.
    fn response_mut(&mut self) -> Option<&mut CoapPacket> {
        if self.response.is_none() {
            self.response = self.request.create_response_with_code(Some(Code::Content));
        }
        self.response.as_mut()
    }

    pub(crate) fn into_parts(self) -> (CoapPacket, Option<CoapPacket>, TransportContext) {
        (self.request, self.response, self.response_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CoapPacket {
        let mut packet =
            CoapPacket::request("127.0.0.1:5683".parse().unwrap(), Method::Get, "/temp");
        packet.set_message_id(0x1000);
        packet.set_token(Bytes::from_static(&[0x01])).unwrap();
        packet
    }

    #[test]
    fn skeleton_defaults_to_content_piggyback() {
        let exchange = CoapExchange::for_request(request(), TransportContext::NULL);
        let (_, response, _) = exchange.into_parts();
        let response = response.unwrap();
        assert_eq!(response.message_type(), MessageType::Acknowledgement);
        assert_eq!(response.code(), Some(Code::Content));
        assert_eq!(response.message_id(), 0x1000);
        assert_eq!(response.token(), &Bytes::from_static(&[0x01]));
    }

    #[test]
    fn respond_sets_code_and_payload() {
        let mut exchange = CoapExchange::for_request(request(), TransportContext::NULL);
        exchange.respond(Code::Changed, "done");
        let (_, response, _) = exchange.into_parts();
        let response = response.unwrap();
        assert_eq!(response.code(), Some(Code::Changed));
        assert_eq!(response.payload_string(), "done");
    }

    #[test]
    fn suppressed_response_sends_nothing() {
        let mut exchange = CoapExchange::for_request(request(), TransportContext::NULL);
        exchange.set_no_response();
        let (_, response, _) = exchange.into_parts();
        assert!(response.is_none());
    }

    #[test]
    fn mutating_a_non_respondable_exchange_is_a_no_op() {
        // a stray late ACK carrying observe + 2.05 that slipped through the
        // notification path: nothing can be sent back for it
        let mut stray_ack = CoapPacket::new("127.0.0.1:5683".parse().unwrap());
        stray_ack.set_message_type(MessageType::Acknowledgement);
        stray_ack.set_message_id(0x2100);
        stray_ack.set_code(Some(Code::Content));
        stray_ack.headers_mut().observe = Some(7);

        let mut exchange = CoapExchange::for_notification(stray_ack, TransportContext::NULL);
        exchange.respond(Code::Content, "ignored");
        exchange.set_response_code(Code::Changed);
        exchange.set_response_payload("ignored too");
        exchange.set_response_token(Bytes::from_static(&[0x01])).unwrap();
        assert!(exchange.response_headers_mut().is_none());

        let (_, response, _) = exchange.into_parts();
        assert!(response.is_none());
    }

    #[test]
    fn notification_exchange_pre_arms_empty_ack() {
        let mut notification = CoapPacket::new("127.0.0.1:5683".parse().unwrap());
        notification.set_code(Some(Code::Content));
        notification.set_message_id(0x2000);
        notification.set_token(Bytes::from_static(&[0xAA])).unwrap();
        notification.headers_mut().observe = Some(3);

        let exchange = CoapExchange::for_notification(notification, TransportContext::NULL);
        let (_, response, _) = exchange.into_parts();
        let ack = response.unwrap();
        assert_eq!(ack.message_type(), MessageType::Acknowledgement);
        assert!(ack.is_empty_message());
        assert_eq!(ack.message_id(), 0x2000);
    }
}
