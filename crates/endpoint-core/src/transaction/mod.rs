//! Transactions: one outstanding confirmable exchange each
//!
//! A transaction is created for every outbound CON. It owns the packet, the
//! completion callback, the retransmission bookkeeping and a priority used
//! by the per-endpoint queue. The manager submodules track them: the
//! [`manager::TransactionManager`] while a piggyback response is possible,
//! the [`delayed::DelayedTransactionManager`] once the peer signalled a
//! separate response with an empty ACK.

pub(crate) mod delayed;
pub(crate) mod manager;

use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use tokio::time::Instant;

use rcoap_packet_core::CoapPacket;
use rcoap_transport::TransportContext;

use crate::error::Result;
use crate::transmission::TransmissionParams;

/// Queueing priority of a transaction. Within one endpoint, higher-priority
/// transactions are transmitted first; equal priorities keep FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Identifies a transaction while a piggyback response is possible:
/// `(remote, message id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    pub remote: SocketAddr,
    pub message_id: u16,
}

impl TransactionId {
    pub fn of(packet: &CoapPacket) -> Self {
        Self {
            remote: packet.remote(),
            message_id: packet.message_id(),
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#MID:{}", self.remote, self.message_id)
    }
}

/// Identifies a transaction awaiting a separate response:
/// `(token, remote)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DelayedTransactionId {
    pub token: Bytes,
    pub remote: SocketAddr,
}

impl DelayedTransactionId {
    pub fn new(token: Bytes, remote: SocketAddr) -> Self {
        Self { token, remote }
    }
}

impl fmt::Display for DelayedTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#Token:{:02x?}", self.remote, &self.token[..])
    }
}

/// Completion callback of a transaction. Invoked exactly once, with the
/// response or the terminal error.
pub(crate) type ResponseCallback = Box<dyn FnOnce(Result<CoapPacket>) + Send>;

/// Everything the dispatcher needs to push one packet into the transport.
/// Cloned out of the manager so no lock is held across the send.
pub(crate) struct SendJob {
    pub packet: CoapPacket,
    pub remote: SocketAddr,
    pub context: TransportContext,
}

pub(crate) struct CoapTransaction {
    pub packet: CoapPacket,
    pub id: TransactionId,
    pub context: TransportContext,
    pub priority: Priority,
    callback: Option<ResponseCallback>,
    attempt: u8,
    max_retransmit: u8,
    base_timeout: std::time::Duration,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
}

impl CoapTransaction {
    pub(crate) fn new(
        packet: CoapPacket,
        callback: ResponseCallback,
        context: TransportContext,
        priority: Priority,
        params: &TransmissionParams,
    ) -> Self {
        let id = TransactionId::of(&packet);
        Self {
            packet,
            id,
            context,
            priority,
            callback: Some(callback),
            attempt: 0,
            max_retransmit: params.max_retransmit,
            base_timeout: params.draw_base(),
            started_at: None,
            deadline: None,
        }
    }

    /// Records one transmission and arms the next deadline at
    /// `start + base * 2^attempt`.
    pub(crate) fn mark_sent(&mut self, now: Instant) {
        let started = match self.started_at {
            Some(started) => {
                self.attempt += 1;
                started
            }
            None => {
                self.started_at = Some(now);
                now
            }
        };
        self.deadline =
            Some(started + TransmissionParams::deadline_offset(self.base_timeout, self.attempt));
    }

    /// Replaces the retransmission deadline with an absolute one; used when
    /// the transaction moves to the delayed manager.
    pub(crate) fn arm_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub(crate) fn is_timed_out(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    pub(crate) fn can_retransmit(&self) -> bool {
        self.attempt < self.max_retransmit
    }

    pub(crate) fn send_job(&self) -> SendJob {
        SendJob {
            packet: self.packet.clone(),
            remote: self.id.remote,
            context: self.context.clone(),
        }
    }

    pub(crate) fn delayed_id(&self) -> DelayedTransactionId {
        DelayedTransactionId::new(self.packet.token().clone(), self.id.remote)
    }

    /// Fires the completion callback. A transaction completes at most once;
    /// later calls are no-ops.
    pub(crate) fn complete(mut self, result: Result<CoapPacket>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl fmt::Debug for CoapTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoapTransaction")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .field("deadline", &self.deadline)
            .finish()
    }
}
