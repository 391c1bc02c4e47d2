//! CoAP message types, request methods and response codes
//!
//! RFC 7252 splits the 8-bit code register into a 3-bit class and a 5-bit
//! detail (`c.dd` notation). Class 0 carries request methods, classes 2, 4
//! and 5 carry response codes. The empty code (0.00) is represented by the
//! absence of both a method and a code on the packet.

use std::fmt;

/// CoAP message type from the fixed header (RFC 7252 section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Retransmitted until acknowledged or given up on
    Confirmable,
    /// Fire-and-forget
    NonConfirmable,
    /// Acknowledges a confirmable message, may piggyback a response
    Acknowledgement,
    /// Rejects a message the peer cannot or will not process
    Reset,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Confirmable => write!(f, "CON"),
            MessageType::NonConfirmable => write!(f, "NON"),
            MessageType::Acknowledgement => write!(f, "ACK"),
            MessageType::Reset => write!(f, "RST"),
        }
    }
}

/// Request method (code class 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Response code (code classes 2, 4 and 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    // 2.xx success
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    Continue,
    // 4.xx client error
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestEntityIncomplete,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    // 5.xx server error
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
}

impl Code {
    /// The `(class, detail)` pair for this code.
    pub fn class_detail(&self) -> (u8, u8) {
        match self {
            Code::Created => (2, 1),
            Code::Deleted => (2, 2),
            Code::Valid => (2, 3),
            Code::Changed => (2, 4),
            Code::Content => (2, 5),
            Code::Continue => (2, 31),
            Code::BadRequest => (4, 0),
            Code::Unauthorized => (4, 1),
            Code::BadOption => (4, 2),
            Code::Forbidden => (4, 3),
            Code::NotFound => (4, 4),
            Code::MethodNotAllowed => (4, 5),
            Code::NotAcceptable => (4, 6),
            Code::RequestEntityIncomplete => (4, 8),
            Code::PreconditionFailed => (4, 12),
            Code::RequestEntityTooLarge => (4, 13),
            Code::UnsupportedContentFormat => (4, 15),
            Code::InternalServerError => (5, 0),
            Code::NotImplemented => (5, 1),
            Code::BadGateway => (5, 2),
            Code::ServiceUnavailable => (5, 3),
            Code::GatewayTimeout => (5, 4),
            Code::ProxyingNotSupported => (5, 5),
        }
    }

    /// True for 2.xx codes.
    pub fn is_success(&self) -> bool {
        self.class_detail().0 == 2
    }

    /// True for 4.xx and 5.xx codes.
    pub fn is_error(&self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.class_detail();
        write!(f, "{}.{:02}", class, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_display_uses_dotted_notation() {
        assert_eq!(Code::Content.to_string(), "2.05");
        assert_eq!(Code::NotFound.to_string(), "4.04");
        assert_eq!(Code::InternalServerError.to_string(), "5.00");
    }

    #[test]
    fn code_classes() {
        assert!(Code::Content.is_success());
        assert!(Code::BadOption.is_error());
        assert!(Code::ServiceUnavailable.is_error());
    }
}
