//! Transport layer abstraction for the rcoap stack
//!
//! The endpoint core never touches bytes or sockets; it talks to an object
//! implementing [`CoapTransport`] and receives inbound packets through the
//! [`CoapReceiver`] it registers on start. A datagram transport (UDP, DTLS)
//! plugs in underneath together with a codec; this crate also ships an
//! in-process [`mock::ChannelTransport`] used by tests and demos.

pub mod error;
pub mod mock;
pub mod transport;

pub use error::{Result, TransportError};
pub use transport::{CoapReceiver, CoapTransport, TransportContext};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        mock::ChannelTransport, CoapReceiver, CoapTransport, TransportContext, TransportError,
    };
}
