//! Handler contracts
//!
//! Server-side resources implement [`CoapHandler`]; a client interested in
//! notifications installs an [`ObservationHandler`]. Both are invoked by the
//! dispatcher with an exchange they must not retain past the call.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use rcoap_packet_core::CoapPacket;
use rcoap_transport::TransportContext;

use crate::error::{CoapError, Result};
use crate::server::exchange::CoapExchange;

/// A resource handler.
///
/// Sets its response on the exchange and returns, or returns
/// [`CoapError::Code`](crate::CoapError::Code) to have the endpoint answer
/// with that error code. Any other error becomes 5.00.
#[async_trait]
pub trait CoapHandler: Send + Sync {
    async fn handle(&self, exchange: &mut CoapExchange) -> Result<()>;
}

/// Client-side sink for observe notifications.
#[async_trait]
pub trait ObservationHandler: Send + Sync {
    /// Asked during inbound classification: is this token one of ours?
    fn has_observation(&self, token: &Bytes) -> bool;

    /// A notification arrived. The exchange is pre-armed with an empty ACK
    /// for confirmable notifications; leave it in place or suppress it.
    async fn notification(&self, exchange: &mut CoapExchange);

    /// The peer ended the observation. `error` is always
    /// [`CoapError::ObservationTerminated`] and carries the packet that
    /// triggered the termination (RST, missing observe option, or a
    /// non-notification response code).
    async fn observation_terminated(&self, error: CoapError, context: TransportContext);
}

/// Outcome sink for notification fan-out.
pub trait NotificationDeliveryListener: Send + Sync {
    fn on_success(&self, remote: SocketAddr);
    fn on_fail(&self, remote: SocketAddr);
    fn on_no_observers(&self);
}

/// Listener that ignores every outcome.
pub struct NullDeliveryListener;

impl NotificationDeliveryListener for NullDeliveryListener {
    fn on_success(&self, _remote: SocketAddr) {}
    fn on_fail(&self, _remote: SocketAddr) {}
    fn on_no_observers(&self) {}
}

/// Hook invoked whenever the duplicate detector suppresses a repeated
/// message.
pub trait DuplicatedMessageCallback: Send + Sync {
    fn duplicated(&self, request: &CoapPacket);
}
