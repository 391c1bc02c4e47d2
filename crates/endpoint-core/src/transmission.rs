//! Retransmission schedule for confirmable messages
//!
//! RFC 7252 section 4.2: a CON is retransmitted on an exponentially growing
//! schedule derived from `ACK_TIMEOUT` and `ACK_RANDOM_FACTOR` until
//! `MAX_RETRANSMIT` attempts are spent. The base timeout is drawn once per
//! transaction; the deadline after recording attempt `k` (0-indexed) sits at
//! `start + base * 2^k`, so retransmits land at roughly base * {1, 2, 4, 8}
//! after the first send.

use rand::Rng;
use std::time::Duration;

/// Transmission timing parameters, shared by every transaction the endpoint
/// creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionParams {
    /// Initial acknowledgement timeout (RFC 7252 `ACK_TIMEOUT`, default 2 s)
    pub ack_timeout: Duration,
    /// Maximum number of retransmissions (RFC 7252 `MAX_RETRANSMIT`, default 4)
    pub max_retransmit: u8,
    /// Upper bound of the random spreading factor
    /// (RFC 7252 `ACK_RANDOM_FACTOR`, default 1.5)
    pub ack_random_factor: f64,
}

impl Default for TransmissionParams {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            max_retransmit: 4,
            ack_random_factor: 1.5,
        }
    }
}

impl TransmissionParams {
    /// Draws the per-transaction base timeout:
    /// `ack_timeout * uniform(1.0, ack_random_factor)`.
    pub(crate) fn draw_base(&self) -> Duration {
        let factor = if self.ack_random_factor > 1.0 {
            rand::thread_rng().gen_range(1.0..=self.ack_random_factor)
        } else {
            1.0
        };
        self.ack_timeout.mul_f64(factor)
    }

    /// Offset of the deadline armed after attempt `k`, measured from the
    /// first transmission.
    pub(crate) fn deadline_offset(base: Duration, attempt: u8) -> Duration {
        base.saturating_mul(1u32 << attempt.min(31))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rfc_7252() {
        let params = TransmissionParams::default();
        assert_eq!(params.ack_timeout, Duration::from_secs(2));
        assert_eq!(params.max_retransmit, 4);
        assert_eq!(params.ack_random_factor, 1.5);
    }

    #[test]
    fn deadlines_double_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(TransmissionParams::deadline_offset(base, 0), Duration::from_secs(2));
        assert_eq!(TransmissionParams::deadline_offset(base, 1), Duration::from_secs(4));
        assert_eq!(TransmissionParams::deadline_offset(base, 2), Duration::from_secs(8));
        assert_eq!(TransmissionParams::deadline_offset(base, 4), Duration::from_secs(32));
    }

    #[test]
    fn base_stays_within_random_factor() {
        let params = TransmissionParams::default();
        for _ in 0..32 {
            let base = params.draw_base();
            assert!(base >= Duration::from_secs(2));
            assert!(base <= Duration::from_secs(3));
        }
    }
}
