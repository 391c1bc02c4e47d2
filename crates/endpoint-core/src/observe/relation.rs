//! One observer of one resource

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// Observe sequence numbers are 24 bits wide on the wire.
const OBSERVE_SEQ_MASK: u32 = 0x00FF_FFFF;

/// A single observation relation: token, address, sequence counter and
/// delivery state.
pub struct ObservationRelation {
    token: Bytes,
    remote: SocketAddr,
    observe_seq: u32,
    confirmable: bool,
    delivering: bool,
    auto_removable: bool,
}

impl ObservationRelation {
    /// Creates a relation seeded with the observe value from the
    /// registration request.
    pub fn new(token: Bytes, remote: SocketAddr, initial_seq: u32, confirmable: bool) -> Self {
        Self {
            token,
            remote,
            observe_seq: initial_seq & OBSERVE_SEQ_MASK,
            confirmable,
            delivering: false,
            auto_removable: true,
        }
    }

    pub fn token(&self) -> &Bytes {
        &self.token
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Current sequence number, i.e. the one carried by the last
    /// notification (or the registration response).
    pub fn observe_seq(&self) -> u32 {
        self.observe_seq
    }

    /// Advances and returns the sequence number, wrapping at 2^24.
    pub fn next_observe_seq(&mut self) -> u32 {
        self.observe_seq = (self.observe_seq + 1) & OBSERVE_SEQ_MASK;
        self.observe_seq
    }

    /// Whether this observer asked for confirmable notifications.
    pub fn is_confirmable(&self) -> bool {
        self.confirmable
    }

    /// A confirmable notification is in flight and unacknowledged.
    pub fn is_delivering(&self) -> bool {
        self.delivering
    }

    pub(crate) fn set_delivering(&mut self, delivering: bool) {
        self.delivering = delivering;
    }

    /// Whether a failed confirmable notification removes this relation.
    pub fn is_auto_removable(&self) -> bool {
        self.auto_removable
    }

    pub fn set_auto_removable(&mut self, auto_removable: bool) {
        self.auto_removable = auto_removable;
    }
}

impl fmt::Display for ObservationRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{:02x?} seq:{}",
            self.remote,
            &self.token[..],
            self.observe_seq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(initial: u32) -> ObservationRelation {
        ObservationRelation::new(
            Bytes::from_static(&[0xAA]),
            "127.0.0.1:5683".parse().unwrap(),
            initial,
            false,
        )
    }

    #[test]
    fn sequence_increases_strictly() {
        let mut relation = relation(0);
        assert_eq!(relation.observe_seq(), 0);
        assert_eq!(relation.next_observe_seq(), 1);
        assert_eq!(relation.next_observe_seq(), 2);
    }

    #[test]
    fn sequence_wraps_at_24_bits() {
        let mut relation = relation(0x00FF_FFFE);
        assert_eq!(relation.next_observe_seq(), 0x00FF_FFFF);
        assert_eq!(relation.next_observe_seq(), 0);
    }
}
