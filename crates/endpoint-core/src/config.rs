//! Endpoint configuration
//!
//! Every knob has the default the protocol (or the original deployment
//! experience behind it) suggests; `CoapConfig::default()` is a production
//! configuration.

use std::time::Duration;

use rcoap_packet_core::BlockSize;

use crate::transaction::Priority;
use crate::transmission::TransmissionParams;

/// Configuration for a [`crate::CoapServer`].
#[derive(Debug, Clone)]
pub struct CoapConfig {
    /// Maximum number of entries in the duplicate-detection cache.
    /// Zero disables duplicate detection entirely.
    pub duplication_list_size: usize,
    /// How long a duplicate-detection entry stays valid
    pub duplication_timeout: Duration,
    /// How long to wait for a separate response after an empty ACK
    pub delayed_transaction_timeout: Duration,
    /// Fixed delay between retransmission-worker runs
    pub tick_period: Duration,
    /// Retransmission timing for confirmable messages
    pub transmission: TransmissionParams,
    /// Per-endpoint cap on simultaneously tracked transactions;
    /// `None` means unbounded
    pub endpoint_queue_limit: Option<usize>,
    /// Reject requests carrying unrecognized critical options with 4.02
    pub critical_option_test: bool,
    /// When set, notification payloads larger than this are cut down to
    /// their first block2 block
    pub block_size: Option<BlockSize>,
    /// Priority assigned to transactions created by plain `make_request`
    pub default_priority: Priority,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            duplication_list_size: 10_000,
            duplication_timeout: Duration::from_secs(30),
            delayed_transaction_timeout: Duration::from_secs(120),
            tick_period: Duration::from_secs(1),
            transmission: TransmissionParams::default(),
            endpoint_queue_limit: None,
            critical_option_test: true,
            block_size: None,
            default_priority: Priority::Normal,
        }
    }
}
