//! Core transport traits
//!
//! Mirrors the contract the endpoint expects from RFC 7252's message layer
//! substrate: a transport is started with a receiver, can send decoded
//! packets to a remote, and reports its local address. Framing, encoding and
//! retransmission are explicitly *not* the transport's business.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use rcoap_packet_core::CoapPacket;

use crate::error::Result;

/// Opaque per-datagram context round-tripped between inbound and outbound
/// calls.
///
/// A secure transport uses this to pin a response to the session the request
/// arrived on; the endpoint core never inspects it.
#[derive(Clone, Default)]
pub struct TransportContext(Option<Arc<dyn Any + Send + Sync>>);

impl TransportContext {
    /// The empty context.
    pub const NULL: TransportContext = TransportContext(None);

    /// Wraps an arbitrary transport-owned value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        TransportContext(Some(Arc::new(value)))
    }

    /// Downcasts the carried value, if any.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "TransportContext::NULL")
        } else {
            write!(f, "TransportContext(..)")
        }
    }
}

/// Receiver side of the transport: the endpoint implements this and hands
/// itself to [`CoapTransport::start`].
#[async_trait]
pub trait CoapReceiver: Send + Sync {
    /// Called by the transport for every decoded inbound packet.
    async fn handle(&self, packet: CoapPacket, context: TransportContext);
}

/// A datagram transport carrying decoded CoAP packets.
#[async_trait]
pub trait CoapTransport: Send + Sync {
    /// Starts the transport and registers the inbound receiver.
    async fn start(&self, receiver: Arc<dyn CoapReceiver>) -> Result<()>;

    /// Stops the transport; inbound delivery ceases.
    async fn stop(&self);

    /// Sends one packet to `remote`. `context` is the value that arrived with
    /// the request this packet responds to, or [`TransportContext::NULL`].
    async fn send(
        &self,
        packet: &CoapPacket,
        remote: SocketAddr,
        context: &TransportContext,
    ) -> Result<()>;

    /// The local address this transport is bound to.
    fn local_address(&self) -> Result<SocketAddr>;
}
