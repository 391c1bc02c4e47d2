//! Observable resource wrapper
//!
//! Wraps an ordinary request handler and manages the observation relations
//! registered against it: registration and de-registration on GET, change
//! notification fan-out, the periodic confirmable probe, and termination.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

use rcoap_packet_core::{BlockOption, CoapPacket, Code, MessageType, Method};

use crate::error::Result;
use crate::observe::ObservationRelation;
use crate::server::exchange::CoapExchange;
use crate::server::handler::{CoapHandler, NotificationDeliveryListener};
use crate::server::CoapServer;
use crate::transaction::Priority;

/// Every n-th notification per relation is sent confirmable even for
/// observers that registered non-confirmable, so silently dead observers are
/// eventually detected.
pub const DEFAULT_FORCE_CON_FREQ: u32 = 20;

/// Metadata attached to a change notification.
#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    pub content_format: Option<u16>,
    pub etag: Option<Bytes>,
    pub max_age: Option<u64>,
}

type Relations = Arc<Mutex<HashMap<SocketAddr, ObservationRelation>>>;

enum Dispatch {
    Con(SocketAddr, CoapPacket),
    Non(SocketAddr, CoapPacket),
}

/// A resource whose representation can be observed.
pub struct ObservableResource {
    inner: Arc<dyn CoapHandler>,
    relations: Relations,
    force_con_freq: u32,
    con_notifications: Mutex<Option<bool>>,
    remove_on_plain_get: bool,
}

impl ObservableResource {
    pub fn new(inner: Arc<dyn CoapHandler>) -> Self {
        Self {
            inner,
            relations: Arc::new(Mutex::new(HashMap::new())),
            force_con_freq: DEFAULT_FORCE_CON_FREQ,
            con_notifications: Mutex::new(None),
            remove_on_plain_get: false,
        }
    }

    /// Overrides how often a non-confirmable observer gets a confirmable
    /// probe.
    pub fn with_force_con_freq(mut self, force_con_freq: u32) -> Self {
        self.force_con_freq = force_con_freq.max(1);
        self
    }

    /// When set, a plain GET (no observe option, no block options) from a
    /// registered observer cancels its observation.
    pub fn with_remove_on_plain_get(mut self, remove: bool) -> Self {
        self.remove_on_plain_get = remove;
        self
    }

    /// Global override: once set, every notification is sent confirmable
    /// (or non-confirmable) regardless of each observer's preference.
    pub fn set_con_notifications(&self, con_notifications: bool) {
        *self.con_notifications.lock().unwrap() = Some(con_notifications);
    }

    /// Number of currently registered observers.
    pub fn relation_count(&self) -> usize {
        self.relations.lock().unwrap().len()
    }

    /// Registers, refreshes or removes the observation the request asks for.
    /// Returns `false` when the exchange was already answered (tokenless
    /// registration gets a RST) and the inner handler must not run.
    fn add_observer(&self, exchange: &mut CoapExchange) -> Result<bool> {
        let request = exchange.request();
        let remote = request.remote();
        let token = request.token().clone();
        let observe = request.headers().observe;
        let confirmable = request.must_acknowledge();
        let has_block_options =
            request.headers().block1.is_some() || request.headers().block2.is_some();

        let Some(observe) = observe else {
            if !has_block_options && self.remove_on_plain_get {
                if self.relations.lock().unwrap().remove(&remote).is_some() {
                    trace!(%remote, "observation removed");
                }
            }
            return Ok(true);
        };

        if token.is_empty() {
            warn!(%remote, "observation registration without token, ignoring");
            exchange.set_reset_response();
            return Ok(false);
        }

        if has_block_options {
            // mid-transfer request: echo, never touch the registry
            if let Some(headers) = exchange.response_headers_mut() {
                headers.observe = Some(observe);
            }
            exchange.set_response_token(token)?;
            return Ok(true);
        }

        let relation = ObservationRelation::new(token.clone(), remote, observe, confirmable);
        let seq = relation.observe_seq();
        {
            let mut relations = self.relations.lock().unwrap();
            if let Some(existing) = relations.get(&remote) {
                if existing.token() == &token {
                    debug!(%remote, "refreshing observation");
                } else {
                    warn!(%remote, token = ?&token[..], "replacing observation with different token");
                }
            }
            relations.insert(remote, relation);
        }
        if let Some(headers) = exchange.response_headers_mut() {
            headers.observe = Some(seq);
        }
        exchange.set_response_token(token)?;
        Ok(true)
    }

    /// Sends the current representation to every observer.
    ///
    /// Confirmable delivery (per-relation preference, the global override,
    /// or the periodic probe) goes through the transaction machinery and
    /// flips the relation's delivering flag until the exchange settles; a
    /// relation with an unacknowledged notification outstanding is skipped
    /// and reported to the listener.
    pub async fn notify_change(
        &self,
        server: &CoapServer,
        payload: impl Into<Bytes>,
        options: &NotifyOptions,
        listener: Arc<dyn NotificationDeliveryListener>,
    ) -> Result<()> {
        let payload = payload.into();
        let jobs = {
            let mut relations = self.relations.lock().unwrap();
            if relations.is_empty() {
                listener.on_no_observers();
                return Ok(());
            }
            let con_override = *self.con_notifications.lock().unwrap();

            let mut jobs = Vec::with_capacity(relations.len());
            for relation in relations.values_mut() {
                if relation.is_delivering() {
                    warn!(remote = %relation.remote(),
                        "previous notification still unconfirmed, skipping");
                    listener.on_fail(relation.remote());
                    continue;
                }
                let confirmable = con_override.unwrap_or(relation.is_confirmable());
                let seq = relation.next_observe_seq();
                let mut packet =
                    self.notification_packet(server, relation, seq, &payload, options)?;
                if confirmable || seq % self.force_con_freq == 0 {
                    packet.set_message_type(MessageType::Confirmable);
                    relation.set_delivering(true);
                    jobs.push(Dispatch::Con(relation.remote(), packet));
                } else {
                    packet.set_message_type(MessageType::NonConfirmable);
                    jobs.push(Dispatch::Non(relation.remote(), packet));
                }
            }
            jobs
        };

        for job in jobs {
            match job {
                Dispatch::Con(remote, packet) => {
                    let relations = Arc::clone(&self.relations);
                    let listener_for_callback = Arc::clone(&listener);
                    let enqueued = server
                        .make_request_with_callback(
                            packet,
                            Box::new(move |result| {
                                Self::settle_con_notification(&relations, &*listener_for_callback, remote, result)
                            }),
                            Priority::Normal,
                            false,
                        )
                        .await;
                    if let Err(err) = enqueued {
                        warn!(%remote, error = %err, "could not enqueue notification");
                        Self::clear_delivering(&self.relations, remote);
                        listener.on_fail(remote);
                    }
                }
                Dispatch::Non(remote, packet) => {
                    if let Err(err) = server.send_notification(packet).await {
                        warn!(%remote, error = %err, "could not send notification");
                        listener.on_fail(remote);
                    }
                }
            }
        }
        Ok(())
    }

    /// Ends every observation, either with a RST (`code` absent) or with an
    /// error-code notification. Relations are removed as they are notified;
    /// calling this twice is a no-op the second time.
    pub async fn notify_termination(&self, server: &CoapServer, code: Option<Code>) -> Result<()> {
        let drained: Vec<ObservationRelation> = {
            let mut relations = self.relations.lock().unwrap();
            relations.drain().map(|(_, relation)| relation).collect()
        };

        for mut relation in drained {
            match code {
                None => {
                    let mut reset = CoapPacket::new(relation.remote());
                    reset.set_message_type(MessageType::Reset);
                    if let Err(err) = server.send_notification(reset).await {
                        warn!(remote = %relation.remote(), error = %err,
                            "could not send termination reset");
                    }
                }
                Some(code) => {
                    let mut packet = CoapPacket::new(relation.remote());
                    packet.set_code(Some(code));
                    packet.set_token(relation.token().clone())?;
                    packet.headers_mut().observe = Some(relation.next_observe_seq());
                    if relation.is_confirmable() {
                        packet.set_message_type(MessageType::Confirmable);
                        let enqueued = server
                            .make_request_with_callback(
                                packet,
                                Box::new(|_| {}),
                                Priority::Normal,
                                false,
                            )
                            .await;
                        if let Err(err) = enqueued {
                            warn!(remote = %relation.remote(), error = %err,
                                "could not send termination notification");
                        }
                    } else {
                        packet.set_message_type(MessageType::NonConfirmable);
                        if let Err(err) = server.send_notification(packet).await {
                            warn!(remote = %relation.remote(), error = %err,
                                "could not send termination notification");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn notification_packet(
        &self,
        server: &CoapServer,
        relation: &ObservationRelation,
        seq: u32,
        payload: &Bytes,
        options: &NotifyOptions,
    ) -> Result<CoapPacket> {
        let mut packet = CoapPacket::new(relation.remote());
        packet.set_code(Some(Code::Content));
        packet.set_token(relation.token().clone())?;
        let headers = packet.headers_mut();
        headers.observe = Some(seq);
        headers.etag = options.etag.clone();
        headers.max_age = options.max_age;
        headers.content_format = options.content_format;

        match server.block_size() {
            Some(block_size) if payload.len() > block_size.size() => {
                let block = BlockOption::new(0, block_size, true);
                packet.headers_mut().block2 = Some(block);
                packet.set_payload(block.block_part(payload));
            }
            _ => packet.set_payload(payload.clone()),
        }
        Ok(packet)
    }

    /// Completion of a confirmable notification: an ACK clears the
    /// delivering flag, a RST or timeout removes the relation.
    fn settle_con_notification(
        relations: &Relations,
        listener: &dyn NotificationDeliveryListener,
        remote: SocketAddr,
        result: Result<CoapPacket>,
    ) {
        match result {
            Ok(response) if response.message_type() == MessageType::Reset => {
                Self::remove_if_auto_removable(relations, remote);
                listener.on_fail(remote);
            }
            Ok(_ack) => {
                Self::clear_delivering(relations, remote);
                listener.on_success(remote);
            }
            Err(err) => {
                debug!(%remote, error = %err, "notification delivery failed");
                Self::remove_if_auto_removable(relations, remote);
                listener.on_fail(remote);
            }
        }
    }

    fn clear_delivering(relations: &Relations, remote: SocketAddr) {
        if let Some(relation) = relations.lock().unwrap().get_mut(&remote) {
            relation.set_delivering(false);
        }
    }

    fn remove_if_auto_removable(relations: &Relations, remote: SocketAddr) {
        let mut relations = relations.lock().unwrap();
        let auto_removable = relations
            .get(&remote)
            .is_some_and(ObservationRelation::is_auto_removable);
        if auto_removable && relations.remove(&remote).is_some() {
            info!(%remote, "observation removed");
        }
    }
}

#[async_trait]
impl CoapHandler for ObservableResource {
    async fn handle(&self, exchange: &mut CoapExchange) -> Result<()> {
        if exchange.method() == Some(Method::Get) && !self.add_observer(exchange)? {
            return Ok(());
        }
        self.inner.handle(exchange).await
    }
}
