//! Error types for the transport layer

use thiserror::Error;

/// A type alias for handling `Result`s with `TransportError`
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur in the transport layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Transport has not been started or was stopped
    #[error("transport not started")]
    NotStarted,

    /// Transport is already running
    #[error("transport already started")]
    AlreadyStarted,

    /// The peer end of an in-process transport is gone
    #[error("transport channel closed")]
    ChannelClosed,

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(String),
}
