//! Observe (RFC 7641): registration, notification fan-out, the periodic
//! confirmable probe, termination, and the client-side handler.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rcoap_endpoint_core::{
    CoapError, CoapExchange, CoapHandler, CoapServer, NotificationDeliveryListener,
    NotifyOptions, NullDeliveryListener, ObservableResource, ObservationHandler, Result,
};
use rcoap_packet_core::{BlockSize, CoapPacket, Code, MessageType, Method};
use rcoap_transport::mock::{ChannelTransport, OutboundPacket};
use rcoap_transport::TransportContext;
use tokio::sync::mpsc;

struct StaticHandler(&'static str);

#[async_trait]
impl CoapHandler for StaticHandler {
    async fn handle(&self, exchange: &mut CoapExchange) -> Result<()> {
        exchange.set_response_payload(self.0);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingListener {
    successes: Mutex<Vec<SocketAddr>>,
    failures: Mutex<Vec<SocketAddr>>,
}

impl NotificationDeliveryListener for RecordingListener {
    fn on_success(&self, remote: SocketAddr) {
        self.successes.lock().unwrap().push(remote);
    }
    fn on_fail(&self, remote: SocketAddr) {
        self.failures.lock().unwrap().push(remote);
    }
    fn on_no_observers(&self) {}
}

async fn observable_server() -> (
    CoapServer,
    Arc<ChannelTransport>,
    mpsc::UnboundedReceiver<OutboundPacket>,
    Arc<ObservableResource>,
) {
    let (server, transport, outbound) = common::start_server(|builder| builder).await;
    let resource = Arc::new(ObservableResource::new(Arc::new(StaticHandler("v0"))));
    server.add_request_handler("/obs", resource.clone());
    (server, transport, outbound, resource)
}

fn observe_request(mid: u16, token: &[u8], confirmable: bool) -> CoapPacket {
    let mut request = common::peer_request(Method::Get, "/obs", mid);
    if !confirmable {
        request.set_message_type(MessageType::NonConfirmable);
    }
    request.set_token(Bytes::copy_from_slice(token)).unwrap();
    request.headers_mut().observe = Some(0);
    request
}

#[tokio::test]
async fn register_notify_and_remove_on_reset() {
    let (server, transport, mut outbound, resource) = observable_server().await;

    // registration echoes observe seq and token
    common::inject(&transport, observe_request(0x20, &[0xAA], true)).await;
    let response = common::next_outbound(&mut outbound).await;
    assert_eq!(response.packet.code(), Some(Code::Content));
    assert_eq!(response.packet.headers().observe, Some(0));
    assert_eq!(response.packet.token(), &Bytes::from_static(&[0xAA]));
    assert_eq!(resource.relation_count(), 1);

    // first notification: confirmable (CON registration), observe seq 1
    resource
        .notify_change(&server, "v1", &NotifyOptions::default(), Arc::new(NullDeliveryListener))
        .await
        .unwrap();
    let first = common::next_outbound(&mut outbound).await;
    assert_eq!(first.packet.message_type(), MessageType::Confirmable);
    assert_eq!(first.packet.headers().observe, Some(1));
    assert_eq!(first.packet.token(), &Bytes::from_static(&[0xAA]));
    assert_eq!(first.packet.payload_string(), "v1");
    common::inject(&transport, common::peer_empty_ack(first.packet.message_id())).await;

    // second notification: observe seq strictly increases
    resource
        .notify_change(&server, "v2", &NotifyOptions::default(), Arc::new(NullDeliveryListener))
        .await
        .unwrap();
    let second = common::next_outbound(&mut outbound).await;
    assert_eq!(second.packet.headers().observe, Some(2));
    assert_eq!(second.packet.payload_string(), "v2");

    // peer resets the notification: relation is gone
    common::inject(&transport, common::peer_reset(second.packet.message_id())).await;
    assert_eq!(resource.relation_count(), 0);
}

#[tokio::test]
async fn periodic_con_probe_every_nth_notification() {
    let (server, transport, mut outbound) = common::start_server(|builder| builder).await;
    let resource = Arc::new(
        ObservableResource::new(Arc::new(StaticHandler("v0"))).with_force_con_freq(3),
    );
    server.add_request_handler("/obs", resource.clone());

    // non-confirmable registration: notifications default to NON
    common::inject(&transport, observe_request(0x21, &[0xBB], false)).await;
    let _registration = common::next_outbound(&mut outbound).await;

    let mut observed_types = Vec::new();
    for i in 0..9 {
        resource
            .notify_change(
                &server,
                format!("v{i}"),
                &NotifyOptions::default(),
                Arc::new(NullDeliveryListener),
            )
            .await
            .unwrap();
        let notification = common::next_outbound(&mut outbound).await;
        observed_types.push(notification.packet.message_type());
        if notification.packet.message_type() == MessageType::Confirmable {
            common::inject(
                &transport,
                common::peer_empty_ack(notification.packet.message_id()),
            )
            .await;
        }
    }

    use MessageType::{Confirmable as Con, NonConfirmable as Non};
    assert_eq!(
        observed_types,
        vec![Non, Non, Con, Non, Non, Con, Non, Non, Con]
    );
}

#[tokio::test]
async fn undelivered_notification_is_skipped_and_reported() {
    let (server, transport, mut outbound, resource) = observable_server().await;
    let listener = Arc::new(RecordingListener::default());

    common::inject(&transport, observe_request(0x22, &[0xCC], true)).await;
    let _registration = common::next_outbound(&mut outbound).await;

    resource
        .notify_change(&server, "v1", &NotifyOptions::default(), listener.clone())
        .await
        .unwrap();
    let first = common::next_outbound(&mut outbound).await;
    assert_eq!(first.packet.message_type(), MessageType::Confirmable);

    // the CON is still unacknowledged; the next change is dropped for this
    // relation and reported as failed
    resource
        .notify_change(&server, "v2", &NotifyOptions::default(), listener.clone())
        .await
        .unwrap();
    common::assert_no_outbound(&mut outbound);
    assert_eq!(listener.failures.lock().unwrap().as_slice(), &[common::remote_addr()]);

    // after the ACK, notifications flow again
    common::inject(&transport, common::peer_empty_ack(first.packet.message_id())).await;
    assert_eq!(listener.successes.lock().unwrap().as_slice(), &[common::remote_addr()]);
    resource
        .notify_change(&server, "v3", &NotifyOptions::default(), listener.clone())
        .await
        .unwrap();
    let next = common::next_outbound(&mut outbound).await;
    assert_eq!(next.packet.payload_string(), "v3");
}

#[tokio::test]
async fn tokenless_registration_is_rejected_with_reset() {
    let (_server, transport, mut outbound, resource) = observable_server().await;

    let mut request = common::peer_request(Method::Get, "/obs", 0x23);
    request.headers_mut().observe = Some(0);
    common::inject(&transport, request).await;

    let response = common::next_outbound(&mut outbound).await;
    assert_eq!(response.packet.message_type(), MessageType::Reset);
    assert_eq!(resource.relation_count(), 0);
}

#[tokio::test]
async fn plain_get_deregisters_when_policy_enabled() {
    let (server, transport, mut outbound) = common::start_server(|builder| builder).await;
    let resource = Arc::new(
        ObservableResource::new(Arc::new(StaticHandler("v0"))).with_remove_on_plain_get(true),
    );
    server.add_request_handler("/obs", resource.clone());

    common::inject(&transport, observe_request(0x24, &[0xDD], true)).await;
    let _registration = common::next_outbound(&mut outbound).await;
    assert_eq!(resource.relation_count(), 1);

    // same peer, plain GET, no observe and no block options
    common::inject(&transport, common::peer_request(Method::Get, "/obs", 0x25)).await;
    let _response = common::next_outbound(&mut outbound).await;
    assert_eq!(resource.relation_count(), 0);
}

#[tokio::test]
async fn termination_resets_observers_exactly_once() {
    let (server, transport, mut outbound, resource) = observable_server().await;

    common::inject(&transport, observe_request(0x26, &[0xEE], true)).await;
    let _registration = common::next_outbound(&mut outbound).await;

    resource.notify_termination(&server, None).await.unwrap();
    let reset = common::next_outbound(&mut outbound).await;
    assert_eq!(reset.packet.message_type(), MessageType::Reset);
    assert_eq!(resource.relation_count(), 0);

    // second call finds nothing to do
    resource.notify_termination(&server, None).await.unwrap();
    common::assert_no_outbound(&mut outbound);
}

#[tokio::test]
async fn oversized_notification_carries_first_block() {
    let (server, transport, mut outbound) =
        common::start_server(|builder| builder.block_size(BlockSize::S16)).await;
    let resource = Arc::new(ObservableResource::new(Arc::new(StaticHandler("v0"))));
    server.add_request_handler("/obs", resource.clone());

    common::inject(&transport, observe_request(0x27, &[0xFF], true)).await;
    let _registration = common::next_outbound(&mut outbound).await;

    resource
        .notify_change(
            &server,
            "a payload well beyond sixteen bytes",
            &NotifyOptions::default(),
            Arc::new(NullDeliveryListener),
        )
        .await
        .unwrap();
    let notification = common::next_outbound(&mut outbound).await;
    let block2 = notification.packet.headers().block2.unwrap();
    assert_eq!(block2.num, 0);
    assert!(block2.more);
    assert_eq!(block2.size, BlockSize::S16);
    assert_eq!(notification.packet.payload().len(), 16);
}

/// Client-side observation sink that records what it sees.
struct RecordingObservationHandler {
    token: Bytes,
    notifications: Mutex<Vec<String>>,
    terminations: Mutex<Vec<SocketAddr>>,
}

#[async_trait]
impl ObservationHandler for RecordingObservationHandler {
    fn has_observation(&self, token: &Bytes) -> bool {
        !token.is_empty() && token == &self.token
    }

    async fn notification(&self, exchange: &mut CoapExchange) {
        self.notifications
            .lock()
            .unwrap()
            .push(exchange.request().payload_string());
    }

    async fn observation_terminated(&self, error: CoapError, _context: TransportContext) {
        if let CoapError::ObservationTerminated { remote, .. } = error {
            self.terminations.lock().unwrap().push(remote);
        }
    }
}

#[tokio::test]
async fn inbound_notification_is_delivered_and_acknowledged() {
    let (server, transport, mut outbound) = common::start_server(|builder| builder).await;
    let handler = Arc::new(RecordingObservationHandler {
        token: Bytes::from_static(&[0xAA]),
        notifications: Mutex::new(Vec::new()),
        terminations: Mutex::new(Vec::new()),
    });
    server.set_observation_handler(handler.clone());

    let mut notification = CoapPacket::new(common::remote_addr());
    notification.set_message_id(0x900);
    notification.set_code(Some(Code::Content));
    notification.set_token(Bytes::from_static(&[0xAA])).unwrap();
    notification.headers_mut().observe = Some(5);
    notification.set_payload("fresh");
    common::inject(&transport, notification).await;

    assert_eq!(handler.notifications.lock().unwrap().as_slice(), &["fresh".to_string()]);

    // confirmable notification gets an empty ACK back
    let ack = common::next_outbound(&mut outbound).await;
    assert_eq!(ack.packet.message_type(), MessageType::Acknowledgement);
    assert_eq!(ack.packet.message_id(), 0x900);
    assert!(ack.packet.is_empty_message());
}

#[tokio::test]
async fn non_notification_response_terminates_observation() {
    let (server, transport, _outbound) = common::start_server(|builder| builder).await;
    let handler = Arc::new(RecordingObservationHandler {
        token: Bytes::from_static(&[0xAB]),
        notifications: Mutex::new(Vec::new()),
        terminations: Mutex::new(Vec::new()),
    });
    server.set_observation_handler(handler.clone());

    // an error response to an observed token ends the observation
    let mut gone = CoapPacket::new(common::remote_addr());
    gone.set_message_type(MessageType::NonConfirmable);
    gone.set_message_id(0x901);
    gone.set_code(Some(Code::NotFound));
    gone.set_token(Bytes::from_static(&[0xAB])).unwrap();
    common::inject(&transport, gone).await;

    assert_eq!(
        handler.terminations.lock().unwrap().as_slice(),
        &[common::remote_addr()]
    );
    assert!(handler.notifications.lock().unwrap().is_empty());
}
