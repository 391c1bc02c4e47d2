//! Per-endpoint transaction queueing
//!
//! Each remote endpoint gets a priority queue of pending transactions and a
//! single in-flight slot. The slot can be *locked*: the transaction has been
//! removed for response dispatch, but the next queued transaction must not be
//! promoted until the dispatcher releases the lock. That two-step keeps a
//! response callback's own follow-up request (block-wise transfers do this)
//! ordered after the transaction it completes.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use rcoap_packet_core::CoapPacket;

use crate::error::{CoapError, Result};
use crate::transaction::{CoapTransaction, SendJob, TransactionId};

/// What the tick worker should do with a timed-out transaction.
pub(crate) enum Resend {
    /// Budget remains: push this job into the transport
    Job(SendJob),
    /// Retransmissions exhausted: fail the transaction
    Exhausted,
}

enum Slot {
    Empty,
    InFlight(CoapTransaction),
    /// Transaction removed for dispatch; promotion deferred until unlock
    Locked,
}

impl Slot {
    fn is_occupied(&self) -> bool {
        !matches!(self, Slot::Empty)
    }
}

struct EndpointQueue {
    slot: Slot,
    queue: VecDeque<CoapTransaction>,
}

impl EndpointQueue {
    fn new() -> Self {
        Self {
            slot: Slot::Empty,
            queue: VecDeque::new(),
        }
    }

    fn is_empty(&self) -> bool {
        !self.slot.is_occupied() && self.queue.is_empty()
    }

    fn tracked(&self) -> usize {
        self.queue.len() + usize::from(self.slot.is_occupied())
    }

    fn insert_by_priority(&mut self, trans: CoapTransaction) {
        let position = self
            .queue
            .iter()
            .position(|queued| queued.priority < trans.priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(position, trans);
    }
}

pub(crate) struct TransactionManager {
    inner: Mutex<Inner>,
}

struct Inner {
    endpoints: HashMap<SocketAddr, EndpointQueue>,
    maximum_endpoint_queue_size: Option<usize>,
    total: usize,
}

impl TransactionManager {
    pub(crate) fn new(maximum_endpoint_queue_size: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                endpoints: HashMap::new(),
                maximum_endpoint_queue_size,
                total: 0,
            }),
        }
    }

    /// Admits a transaction. Returns `true` when it went straight into the
    /// in-flight slot and should be transmitted now; `false` when it was
    /// queued behind the current in-flight transaction. Fails with
    /// `TooManyRequestsForEndpoint` when the per-endpoint cap would be
    /// exceeded and `force_admit` is not set.
    pub(crate) fn add_transaction_and_get_ready_to_send(
        &self,
        trans: CoapTransaction,
        force_admit: bool,
    ) -> Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let limit = inner.maximum_endpoint_queue_size;
        let endpoint = inner
            .endpoints
            .entry(trans.id.remote)
            .or_insert_with(EndpointQueue::new);

        if !endpoint.slot.is_occupied() {
            endpoint.slot = Slot::InFlight(trans);
            inner.total += 1;
            return Ok(true);
        }

        if !force_admit {
            if let Some(limit) = limit {
                if endpoint.tracked() >= limit {
                    return Err(CoapError::TooManyRequestsForEndpoint(trans.id.remote));
                }
            }
        }
        endpoint.insert_by_priority(trans);
        inner.total += 1;
        Ok(false)
    }

    /// Marks the in-flight transaction for `id` as transmitted and returns
    /// the job to push into the transport. `None` when the transaction is no
    /// longer in flight (a response raced the caller).
    pub(crate) fn prepare_send(&self, id: &TransactionId, now: Instant) -> Option<SendJob> {
        let mut inner = self.inner.lock().unwrap();
        let endpoint = inner.endpoints.get_mut(&id.remote)?;
        match &mut endpoint.slot {
            Slot::InFlight(trans) if trans.id == *id => {
                trans.mark_sent(now);
                Some(trans.send_job())
            }
            _ => None,
        }
    }

    /// Decides what to do with a timed-out in-flight transaction: resend
    /// (recording the attempt) or report exhaustion.
    pub(crate) fn prepare_resend(&self, id: &TransactionId, now: Instant) -> Option<Resend> {
        let mut inner = self.inner.lock().unwrap();
        let endpoint = inner.endpoints.get_mut(&id.remote)?;
        match &mut endpoint.slot {
            Slot::InFlight(trans) if trans.id == *id => {
                if trans.can_retransmit() {
                    trans.mark_sent(now);
                    Some(Resend::Job(trans.send_job()))
                } else {
                    Some(Resend::Exhausted)
                }
            }
            _ => None,
        }
    }

    /// Atomically removes the in-flight transaction matching `id`, leaving
    /// the endpoint slot locked so nothing is promoted until
    /// [`Self::unlock_or_remove_and_get_next`].
    pub(crate) fn remove_and_lock(&self, id: &TransactionId) -> Option<CoapTransaction> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let endpoint = inner.endpoints.get_mut(&id.remote)?;
        let matched = matches!(&endpoint.slot, Slot::InFlight(trans) if trans.id == *id);
        if !matched {
            return None;
        }
        let Slot::InFlight(trans) = std::mem::replace(&mut endpoint.slot, Slot::Locked) else {
            unreachable!()
        };
        inner.total -= 1;
        Some(trans)
    }

    /// Matches a separate response by `(token, remote)` against the
    /// in-flight transaction for the packet's endpoint. Used when the peer
    /// answered with a fresh confirmable or non-confirmable message instead
    /// of piggybacking; the slot is left locked, as with
    /// [`Self::remove_and_lock`].
    pub(crate) fn find_match_and_remove_for_separate_response(
        &self,
        packet: &CoapPacket,
    ) -> Option<CoapTransaction> {
        if packet.token().is_empty() {
            return None;
        }
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let endpoint = inner.endpoints.get_mut(&packet.remote())?;
        let matched = matches!(
            &endpoint.slot,
            Slot::InFlight(trans) if trans.packet.token() == packet.token()
        );
        if !matched {
            return None;
        }
        let Slot::InFlight(trans) = std::mem::replace(&mut endpoint.slot, Slot::Locked) else {
            unreachable!()
        };
        inner.total -= 1;
        Some(trans)
    }

    /// Releases the lock (or removes a still in-flight transaction) for `id`
    /// and promotes the next queued transaction, returning its id so the
    /// caller can transmit it. `None` when the endpoint queue is empty.
    pub(crate) fn unlock_or_remove_and_get_next(
        &self,
        id: &TransactionId,
    ) -> Option<TransactionId> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let endpoint = inner.endpoints.get_mut(&id.remote)?;
        let unlocked = matches!(&endpoint.slot, Slot::Locked);
        let removed = matches!(&endpoint.slot, Slot::InFlight(trans) if trans.id == *id);
        if unlocked || removed {
            endpoint.slot = Slot::Empty;
        }
        if removed {
            inner.total -= 1;
        }

        let mut next = None;
        if matches!(endpoint.slot, Slot::Empty) {
            if let Some(promoted) = endpoint.queue.pop_front() {
                let next_id = promoted.id;
                trace!(id = %next_id, "promoting queued transaction");
                endpoint.slot = Slot::InFlight(promoted);
                next = Some(next_id);
            }
        }

        if endpoint.is_empty() {
            inner.endpoints.remove(&id.remote);
        }
        next
    }

    /// In-flight transactions whose retransmission deadline has passed.
    pub(crate) fn find_timeout_transactions(&self, now: Instant) -> Vec<TransactionId> {
        let inner = self.inner.lock().unwrap();
        inner
            .endpoints
            .values()
            .filter_map(|endpoint| match &endpoint.slot {
                Slot::InFlight(trans) if trans.is_timed_out(now) => Some(trans.id),
                _ => None,
            })
            .collect()
    }

    /// Removes everything, in-flight and queued. Used on shutdown to fail
    /// all pending callbacks.
    pub(crate) fn drain(&self) -> Vec<CoapTransaction> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut drained = Vec::new();
        for (_, endpoint) in inner.endpoints.drain() {
            if let Slot::InFlight(trans) = endpoint.slot {
                drained.push(trans);
            }
            drained.extend(endpoint.queue);
        }
        inner.total = 0;
        drained
    }

    pub(crate) fn number_of_transactions(&self) -> usize {
        self.inner.lock().unwrap().total
    }
}
