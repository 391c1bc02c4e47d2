//! Shared test harness: a server on a channel transport, with the test
//! playing the remote peer by hand.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use rcoap_endpoint_core::{CoapServer, CoapServerBuilder};
use rcoap_packet_core::{CoapPacket, Code, MessageType, Method};
use rcoap_transport::mock::{ChannelTransport, OutboundPacket};
use rcoap_transport::TransportContext;

pub const LOCAL: &str = "127.0.0.1:5683";
pub const REMOTE: &str = "127.0.0.1:5684";

pub fn local_addr() -> SocketAddr {
    LOCAL.parse().unwrap()
}

pub fn remote_addr() -> SocketAddr {
    REMOTE.parse().unwrap()
}

/// Builds and starts a server over a channel transport. The returned
/// receiver yields everything the server sends.
pub async fn start_server(
    configure: impl FnOnce(CoapServerBuilder) -> CoapServerBuilder,
) -> (
    CoapServer,
    Arc<ChannelTransport>,
    mpsc::UnboundedReceiver<OutboundPacket>,
) {
    let (transport, outbound) = ChannelTransport::new(local_addr());
    let server = configure(CoapServer::builder(transport.clone())).build();
    server.start().await.expect("server start");
    (server, transport, outbound)
}

/// Next packet the server pushed into the transport. The generous timeout
/// only matters under paused time, where it turns a hang into a failure.
pub async fn next_outbound(
    outbound: &mut mpsc::UnboundedReceiver<OutboundPacket>,
) -> OutboundPacket {
    tokio::time::timeout(Duration::from_secs(600), outbound.recv())
        .await
        .expect("timed out waiting for outbound packet")
        .expect("transport closed")
}

pub fn assert_no_outbound(outbound: &mut mpsc::UnboundedReceiver<OutboundPacket>) {
    assert!(
        outbound.try_recv().is_err(),
        "expected no further outbound packets"
    );
}

/// Injects a packet as though the peer had sent it.
pub async fn inject(transport: &ChannelTransport, packet: CoapPacket) {
    transport.deliver(packet, TransportContext::NULL).await;
}

/// An inbound request from the simulated peer.
pub fn peer_request(method: Method, path: &str, mid: u16) -> CoapPacket {
    let mut packet = CoapPacket::request(remote_addr(), method, path);
    packet.set_message_id(mid);
    packet
}

/// A piggyback ACK response from the simulated peer.
pub fn peer_ack(mid: u16, code: Code, token: &[u8], payload: &str) -> CoapPacket {
    let mut packet = CoapPacket::new(remote_addr());
    packet.set_message_type(MessageType::Acknowledgement);
    packet.set_message_id(mid);
    packet.set_code(Some(code));
    packet
        .set_token(bytes::Bytes::copy_from_slice(token))
        .unwrap();
    packet.set_payload(payload.to_string());
    packet
}

/// An empty ACK from the simulated peer.
pub fn peer_empty_ack(mid: u16) -> CoapPacket {
    let mut packet = CoapPacket::new(remote_addr());
    packet.set_message_type(MessageType::Acknowledgement);
    packet.set_message_id(mid);
    packet
}

/// A RST from the simulated peer.
pub fn peer_reset(mid: u16) -> CoapPacket {
    let mut packet = CoapPacket::new(remote_addr());
    packet.set_message_type(MessageType::Reset);
    packet.set_message_id(mid);
    packet
}
