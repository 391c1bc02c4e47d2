//! CoAP endpoint runtime for the rcoap stack
//!
//! Implements the RFC 7252 message layer on top of an abstract datagram
//! transport: queued retransmission of confirmable messages, duplicate
//! detection with response replay, separate-response correlation, and
//! server-side observe (RFC 7641). The endpoint is client and server at
//! once — it dispatches inbound requests to registered handlers and
//! correlates inbound responses with outstanding requests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rcoap_endpoint_core::CoapServer;
//! use rcoap_packet_core::{CoapPacket, Method};
//! use rcoap_transport::mock::ChannelTransport;
//!
//! # async fn example() -> rcoap_endpoint_core::Result<()> {
//! let (transport, _outbound) = ChannelTransport::new("127.0.0.1:5683".parse().unwrap());
//! let server = CoapServer::builder(transport).build();
//! server.start().await?;
//!
//! let request = CoapPacket::request("127.0.0.1:5684".parse().unwrap(), Method::Get, "/temp");
//! let response = server.make_request(request).await?;
//! println!("temperature: {}", response.payload_string());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod observe;
pub mod server;
pub mod transaction;
pub mod transmission;

mod dedup;
mod mid;
mod router;

pub use config::CoapConfig;
pub use error::{CoapError, Result};
pub use observe::{NotifyOptions, ObservableResource, ObservationRelation, DEFAULT_FORCE_CON_FREQ};
pub use server::exchange::CoapExchange;
pub use server::handler::{
    CoapHandler, DuplicatedMessageCallback, NotificationDeliveryListener, NullDeliveryListener,
    ObservationHandler,
};
pub use server::{CoapServer, CoapServerBuilder};
pub use transaction::{DelayedTransactionId, Priority, TransactionId};
pub use transmission::TransmissionParams;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        CoapConfig, CoapError, CoapExchange, CoapHandler, CoapServer, NotificationDeliveryListener,
        NotifyOptions, NullDeliveryListener, ObservableResource, ObservationHandler, Priority,
        TransmissionParams,
    };
    pub use rcoap_packet_core::prelude::*;
    pub use rcoap_transport::prelude::*;
}
