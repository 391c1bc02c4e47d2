//! CoAP message model for the rcoap stack
//!
//! This crate provides the decoded message value type ([`CoapPacket`]) that the
//! rest of the stack operates on, together with the message type, method and
//! response code enums and the option set ([`HeaderOptions`]).
//!
//! Wire-format encoding and decoding is deliberately absent: a codec sits in
//! front of the transport and hands fully decoded packets to the endpoint.

pub mod block;
pub mod code;
pub mod error;
pub mod options;
pub mod packet;

pub use block::{BlockOption, BlockSize};
pub use code::{Code, Method, MessageType};
pub use error::{PacketError, Result};
pub use options::HeaderOptions;
pub use packet::CoapPacket;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        BlockOption, BlockSize, CoapPacket, Code, HeaderOptions, MessageType, Method, PacketError,
    };
}
