//! Separate-response correlation
//!
//! When a peer answers a CON request with an empty ACK, the real response
//! arrives later as an independent message carrying the request token. The
//! transaction parks here, keyed `(token, remote)`, until that response
//! shows up or the delay window closes. Outbound NON requests start here
//! directly, since they never get a piggyback response.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::transaction::{CoapTransaction, DelayedTransactionId};

pub(crate) struct DelayedTransactionManager {
    transactions: Mutex<HashMap<DelayedTransactionId, CoapTransaction>>,
}

impl DelayedTransactionManager {
    pub(crate) fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Parks a transaction. An existing entry under the same id is replaced
    /// and dropped without completing.
    pub(crate) fn add(&self, id: DelayedTransactionId, trans: CoapTransaction) {
        self.transactions.lock().unwrap().insert(id, trans);
    }

    pub(crate) fn remove(&self, id: &DelayedTransactionId) -> Option<CoapTransaction> {
        self.transactions.lock().unwrap().remove(id)
    }

    /// Ids whose delay window has closed.
    pub(crate) fn find_timeout_transactions(&self, now: Instant) -> Vec<DelayedTransactionId> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, trans)| trans.is_timed_out(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Removes everything; used on shutdown.
    pub(crate) fn drain(&self) -> Vec<CoapTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .drain()
            .map(|(_, trans)| trans)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Priority;
    use crate::transmission::TransmissionParams;
    use bytes::Bytes;
    use rcoap_packet_core::{CoapPacket, Method};
    use rcoap_transport::TransportContext;
    use std::time::Duration;

    fn delayed_transaction(token: &'static [u8]) -> (DelayedTransactionId, CoapTransaction) {
        let mut packet = CoapPacket::request("127.0.0.1:5683".parse().unwrap(), Method::Get, "/slow");
        packet.set_token(Bytes::from_static(token)).unwrap();
        let trans = CoapTransaction::new(
            packet,
            Box::new(|_| {}),
            TransportContext::NULL,
            Priority::Normal,
            &TransmissionParams::default(),
        );
        (trans.delayed_id(), trans)
    }

    #[tokio::test(start_paused = true)]
    async fn transactions_time_out_after_delay_window() {
        let manager = DelayedTransactionManager::new();
        let (id, mut trans) = delayed_transaction(&[0x02]);
        trans.arm_deadline(Instant::now() + Duration::from_secs(120));
        manager.add(id.clone(), trans);

        assert!(manager.find_timeout_transactions(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(manager.find_timeout_transactions(Instant::now()), vec![id.clone()]);

        assert!(manager.remove(&id).is_some());
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn lookups_are_token_and_remote_scoped() {
        let manager = DelayedTransactionManager::new();
        let (id, trans) = delayed_transaction(&[0xAA]);
        manager.add(id.clone(), trans);

        let other = DelayedTransactionId::new(
            Bytes::from_static(&[0xBB]),
            "127.0.0.1:5683".parse().unwrap(),
        );
        assert!(manager.remove(&other).is_none());
        assert!(manager.remove(&id).is_some());
    }
}
