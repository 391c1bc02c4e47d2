//! Error types for the packet layer

use thiserror::Error;

/// A type alias for handling `Result`s with `PacketError`
pub type Result<T> = std::result::Result<T, PacketError>;

/// Errors raised while validating decoded packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// An option with an odd (critical) number was not recognized
    #[error("unknown critical option {0}")]
    UnknownCriticalOption(u16),

    /// Token longer than the 8 bytes RFC 7252 allows
    #[error("token too long: {0} bytes")]
    TokenTooLong(usize),

    /// The packet cannot carry a response (e.g. it is itself an ACK or RST)
    #[error("message cannot be responded to")]
    NotRespondable,
}
