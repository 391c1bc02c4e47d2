//! Duplicate detection
//!
//! Retransmitted requests must not reach a handler twice. Every inbound
//! request is recorded under `(remote, message id)`; once the response goes
//! out it is cached under the same key so a late retransmission can be
//! answered by replaying it. Entries expire after a fixed timeout and the
//! cache is capped, dropping oldest-inserted entries first.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use rcoap_packet_core::CoapPacket;

use crate::config::CoapConfig;

/// Outcome of checking an inbound request against the cache.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DuplicateState {
    /// Not seen before; an empty entry was recorded, process the request
    FirstSeen,
    /// Seen, and the original is still being processed; drop silently
    PendingResponse,
    /// Seen and answered; replay this response
    Replied(CoapPacket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DuplicateKey {
    remote: SocketAddr,
    message_id: u16,
}

impl DuplicateKey {
    fn of(packet: &CoapPacket) -> Self {
        Self {
            remote: packet.remote(),
            message_id: packet.message_id(),
        }
    }
}

struct Entry {
    inserted: Instant,
    response: Option<CoapPacket>,
}

struct Inner {
    entries: HashMap<DuplicateKey, Entry>,
    insertion_order: VecDeque<DuplicateKey>,
}

pub(crate) struct DuplicationDetector {
    inner: Mutex<Inner>,
    timeout: std::time::Duration,
    max_size: usize,
}

impl DuplicationDetector {
    pub(crate) fn new(config: &CoapConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            timeout: config.duplication_timeout,
            max_size: config.duplication_list_size,
        }
    }

    /// Records the request if it is new, otherwise reports how it was seen
    /// before.
    pub(crate) fn observe(&self, request: &CoapPacket) -> DuplicateState {
        let key = DuplicateKey::of(request);
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.entries.get(&key) {
            return match &entry.response {
                Some(response) => DuplicateState::Replied(response.clone()),
                None => DuplicateState::PendingResponse,
            };
        }

        while inner.entries.len() >= self.max_size {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
                trace!(?oldest, "duplicate cache full, dropped oldest entry");
            } else {
                break;
            }
        }

        inner.entries.insert(
            key,
            Entry {
                inserted: Instant::now(),
                response: None,
            },
        );
        inner.insertion_order.push_back(key);
        DuplicateState::FirstSeen
    }

    /// Stores the response sent for `request` so later retransmissions can
    /// replay it.
    pub(crate) fn put_response(&self, request: &CoapPacket, response: &CoapPacket) {
        let key = DuplicateKey::of(request);
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.response = Some(response.clone());
            return;
        }
        inner.entries.insert(
            key,
            Entry {
                inserted: Instant::now(),
                response: Some(response.clone()),
            },
        );
        inner.insertion_order.push_back(key);
    }

    /// Drops entries older than the configured timeout. Driven by the
    /// endpoint's periodic tick.
    pub(crate) fn evict_stale(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        while let Some(oldest) = inner.insertion_order.front().copied() {
            let expired = match inner.entries.get(&oldest) {
                Some(entry) => now.duration_since(entry.inserted) >= self.timeout,
                // key already evicted by the capacity path
                None => true,
            };
            if !expired {
                break;
            }
            inner.insertion_order.pop_front();
            inner.entries.remove(&oldest);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}
