//! Decoded CoAP option set
//!
//! The codec decodes the options it understands into the typed fields below
//! and parks everything else in `unrecognized`. Odd option numbers are
//! critical (RFC 7252 section 5.4.1): an endpoint that does not understand a
//! critical option must reject the request, which is what
//! [`HeaderOptions::critical_option_check`] is for.

use bytes::Bytes;

use crate::block::BlockOption;
use crate::error::{PacketError, Result};

/// The option set carried by a [`crate::CoapPacket`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOptions {
    /// Observe option (RFC 7641), 24-bit sequence number
    pub observe: Option<u32>,
    /// Uri-Path joined with `/` separators, leading slash included
    pub uri_path: Option<String>,
    /// ETag option
    pub etag: Option<Bytes>,
    /// Max-Age option in seconds
    pub max_age: Option<u64>,
    /// Content-Format registry value
    pub content_format: Option<u16>,
    /// Block1 option (request payload transfer)
    pub block1: Option<BlockOption>,
    /// Block2 option (response payload transfer)
    pub block2: Option<BlockOption>,
    /// Options the codec decoded but this stack does not understand,
    /// as `(option number, raw value)` pairs
    pub unrecognized: Vec<(u16, Bytes)>,
}

impl HeaderOptions {
    /// Fails on the first unrecognized critical (odd-numbered) option.
    pub fn critical_option_check(&self) -> Result<()> {
        for (number, _) in &self.unrecognized {
            if number % 2 == 1 {
                return Err(PacketError::UnknownCriticalOption(*number));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elective_unknown_options_pass() {
        let mut opts = HeaderOptions::default();
        opts.unrecognized.push((24, Bytes::from_static(b"x")));
        assert!(opts.critical_option_check().is_ok());
    }

    #[test]
    fn critical_unknown_option_fails() {
        let mut opts = HeaderOptions::default();
        opts.unrecognized.push((24, Bytes::from_static(b"x")));
        opts.unrecognized.push((2053, Bytes::from_static(b"y")));
        assert_eq!(
            opts.critical_option_check(),
            Err(PacketError::UnknownCriticalOption(2053))
        );
    }
}
