//! In-process channel transport
//!
//! Carries decoded packets over tokio channels instead of a socket. Tests use
//! a single [`ChannelTransport`] and play the peer themselves: outbound
//! packets pop out of the handle returned by [`ChannelTransport::new`], and
//! inbound packets are injected with [`ChannelTransport::deliver`].
//! [`ChannelTransport::pair`] wires two of them back to back for loopback
//! demos.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use rcoap_packet_core::CoapPacket;

use crate::error::{Result, TransportError};
use crate::transport::{CoapReceiver, CoapTransport, TransportContext};

/// One packet captured on the outbound side of a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub packet: CoapPacket,
    pub destination: SocketAddr,
    pub context: TransportContext,
}

/// A transport that moves packets through in-process channels.
pub struct ChannelTransport {
    local: SocketAddr,
    outbound: mpsc::UnboundedSender<OutboundPacket>,
    receiver: Mutex<Option<Arc<dyn CoapReceiver>>>,
    running: AtomicBool,
}

impl ChannelTransport {
    /// Creates a transport bound to `local`, returning the outbound capture
    /// side along with it.
    pub fn new(local: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundPacket>) {
        let (outbound, captured) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            local,
            outbound,
            receiver: Mutex::new(None),
            running: AtomicBool::new(false),
        });
        (transport, captured)
    }

    /// Wires two transports back to back: whatever one sends arrives at the
    /// other's receiver, with the packet's remote rewritten to the sender's
    /// address the way a datagram decoder would.
    pub fn pair(a_local: SocketAddr, b_local: SocketAddr) -> (Arc<Self>, Arc<Self>) {
        let (a, a_out) = Self::new(a_local);
        let (b, b_out) = Self::new(b_local);
        tokio::spawn(Self::forward(a_out, a_local, Arc::clone(&b)));
        tokio::spawn(Self::forward(b_out, b_local, Arc::clone(&a)));
        (a, b)
    }

    async fn forward(
        mut outbound: mpsc::UnboundedReceiver<OutboundPacket>,
        sender_addr: SocketAddr,
        peer: Arc<ChannelTransport>,
    ) {
        while let Some(OutboundPacket { mut packet, context, .. }) = outbound.recv().await {
            packet.set_remote(sender_addr);
            peer.deliver(packet, context).await;
        }
    }

    /// Injects one inbound packet, as though it had just been decoded off the
    /// wire. Dropped with a warning when the transport is not started.
    pub async fn deliver(&self, packet: CoapPacket, context: TransportContext) {
        let receiver = self.receiver.lock().unwrap().clone();
        match receiver {
            Some(receiver) if self.running.load(Ordering::SeqCst) => {
                receiver.handle(packet, context).await;
            }
            _ => warn!(local = %self.local, "inbound packet dropped, transport not started"),
        }
    }
}

#[async_trait]
impl CoapTransport for ChannelTransport {
    async fn start(&self, receiver: Arc<dyn CoapReceiver>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        *self.receiver.lock().unwrap() = Some(receiver);
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.receiver.lock().unwrap().take();
    }

    async fn send(
        &self,
        packet: &CoapPacket,
        remote: SocketAddr,
        context: &TransportContext,
    ) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        self.outbound
            .send(OutboundPacket {
                packet: packet.clone(),
                destination: remote,
                context: context.clone(),
            })
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn local_address(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcoap_packet_core::Method;

    struct CollectingReceiver(mpsc::UnboundedSender<CoapPacket>);

    #[async_trait]
    impl CoapReceiver for CollectingReceiver {
        async fn handle(&self, packet: CoapPacket, _context: TransportContext) {
            let _ = self.0.send(packet);
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn send_requires_start() {
        let (transport, _captured) = ChannelTransport::new(addr(5683));
        let packet = CoapPacket::request(addr(5684), Method::Get, "/x");
        let err = transport
            .send(&packet, addr(5684), &TransportContext::NULL)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotStarted);
    }

    #[tokio::test]
    async fn pair_rewrites_remote_to_sender() {
        let (a, b) = ChannelTransport::pair(addr(10001), addr(10002));
        let (tx, mut rx) = mpsc::unbounded_channel();
        a.start(Arc::new(CollectingReceiver(tx.clone()))).await.unwrap();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        b.start(Arc::new(CollectingReceiver(tx_b))).await.unwrap();
        drop(tx);

        let packet = CoapPacket::request(addr(10002), Method::Get, "/x");
        a.send(&packet, addr(10002), &TransportContext::NULL).await.unwrap();

        let received = rx_b.recv().await.unwrap();
        assert_eq!(received.remote(), addr(10001));
        assert!(rx.try_recv().is_err());
    }
}
