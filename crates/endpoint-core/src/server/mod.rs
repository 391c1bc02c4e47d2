//! CoAP endpoint: inbound dispatch, the request API and the periodic
//! retransmission worker
//!
//! The [`CoapServer`] acts as server and client at once. Inbound packets are
//! classified as ping, request, response, separate response or notification
//! and routed accordingly; outbound confirmable requests run through the
//! per-endpoint transaction queues with retransmission driven by a single
//! periodic tick.

pub mod exchange;
pub mod handler;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use rcoap_packet_core::{BlockSize, CoapPacket, Code, MessageType};
use rcoap_transport::{CoapReceiver, CoapTransport, TransportContext};

use crate::config::CoapConfig;
use crate::dedup::{DuplicateState, DuplicationDetector};
use crate::error::{CoapError, Result};
use crate::mid::MessageIdSupplier;
use crate::router::ResourceRouter;
use crate::server::exchange::CoapExchange;
use crate::server::handler::{CoapHandler, DuplicatedMessageCallback, ObservationHandler};
use crate::transaction::delayed::DelayedTransactionManager;
use crate::transaction::manager::{Resend, TransactionManager};
use crate::transaction::{
    CoapTransaction, DelayedTransactionId, Priority, ResponseCallback, TransactionId,
};
use crate::transmission::TransmissionParams;

/// Builder for a [`CoapServer`].
pub struct CoapServerBuilder {
    transport: Arc<dyn CoapTransport>,
    config: CoapConfig,
}

impl CoapServerBuilder {
    fn new(transport: Arc<dyn CoapTransport>) -> Self {
        Self {
            transport,
            config: CoapConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CoapConfig) -> Self {
        self.config = config;
        self
    }

    /// Size of the duplicate-detection cache; zero disables detection.
    pub fn duplication_list_size(mut self, size: usize) -> Self {
        self.config.duplication_list_size = size;
        self
    }

    pub fn duplication_timeout(mut self, timeout: Duration) -> Self {
        self.config.duplication_timeout = timeout;
        self
    }

    /// How long to wait for a separate response after an empty ACK.
    pub fn delayed_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.config.delayed_transaction_timeout = timeout;
        self
    }

    pub fn transmission(mut self, params: TransmissionParams) -> Self {
        self.config.transmission = params;
        self
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    /// Caps how many transactions one remote endpoint may have queued.
    pub fn endpoint_queue_limit(mut self, limit: usize) -> Self {
        self.config.endpoint_queue_limit = Some(limit);
        self
    }

    pub fn critical_option_test(mut self, enabled: bool) -> Self {
        self.config.critical_option_test = enabled;
        self
    }

    pub fn block_size(mut self, block_size: BlockSize) -> Self {
        self.config.block_size = Some(block_size);
        self
    }

    pub fn default_priority(mut self, priority: Priority) -> Self {
        self.config.default_priority = priority;
        self
    }

    pub fn build(self) -> CoapServer {
        let config = self.config;
        let dedup = (config.duplication_list_size > 0).then(|| DuplicationDetector::new(&config));
        CoapServer {
            inner: Arc::new(ServerInner {
                transactions: TransactionManager::new(config.endpoint_queue_limit),
                delayed: DelayedTransactionManager::new(),
                dedup,
                mid: MessageIdSupplier::new(),
                router: ResourceRouter::new(),
                observation_handler: RwLock::new(None),
                duplicate_callback: RwLock::new(None),
                running: AtomicBool::new(false),
                tick_worker: Mutex::new(None),
                transport: self.transport,
                config,
            }),
        }
    }
}

/// A CoAP endpoint (RFC 7252).
///
/// Cheap to clone; clones share the same endpoint state.
#[derive(Clone)]
pub struct CoapServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: CoapConfig,
    transport: Arc<dyn CoapTransport>,
    mid: MessageIdSupplier,
    transactions: TransactionManager,
    delayed: DelayedTransactionManager,
    dedup: Option<DuplicationDetector>,
    router: ResourceRouter,
    observation_handler: RwLock<Option<Arc<dyn ObservationHandler>>>,
    duplicate_callback: RwLock<Option<Arc<dyn DuplicatedMessageCallback>>>,
    running: AtomicBool,
    tick_worker: Mutex<Option<JoinHandle<()>>>,
}

impl CoapServer {
    pub fn builder(transport: Arc<dyn CoapTransport>) -> CoapServerBuilder {
        CoapServerBuilder::new(transport)
    }

    /// Starts the transport and the retransmission worker.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(CoapError::InvalidState("server is already running"));
        }
        let receiver: Arc<dyn CoapReceiver> = Arc::new(self.clone());
        if let Err(err) = self.inner.transport.start(receiver).await {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        self.start_tick_worker();
        debug!("CoAP server started");
        Ok(())
    }

    /// Stops the endpoint. Every pending transaction, primary or delayed,
    /// fails synchronously with [`CoapError::Shutdown`].
    pub async fn stop(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(CoapError::InvalidState("server is not running"));
        }
        trace!("stopping CoAP server..");
        if let Some(worker) = self.inner.tick_worker.lock().unwrap().take() {
            worker.abort();
        }
        self.inner.transport.stop().await;
        for trans in self.inner.transactions.drain() {
            trans.complete(Err(CoapError::Shutdown));
        }
        for trans in self.inner.delayed.drain() {
            trans.complete(Err(CoapError::Shutdown));
        }
        debug!("CoAP server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Address the underlying transport is bound to.
    pub fn local_address(&self) -> Result<SocketAddr> {
        Ok(self.inner.transport.local_address()?)
    }

    /// Registers a request handler. The URI may end in `*` to catch a whole
    /// subtree, e.g. `/sensors/*`.
    pub fn add_request_handler(&self, uri: &str, handler: Arc<dyn CoapHandler>) {
        self.inner.router.add(uri, handler);
    }

    /// Removes every registration of this handler object.
    pub fn remove_request_handler(&self, handler: &Arc<dyn CoapHandler>) {
        self.inner.router.remove(handler);
    }

    /// Installs the client-side sink for observe notifications.
    pub fn set_observation_handler(&self, handler: Arc<dyn ObservationHandler>) {
        *self.inner.observation_handler.write().unwrap() = Some(handler);
        trace!("observation handler set");
    }

    /// Installs a hook invoked whenever a duplicate message is suppressed.
    pub fn set_duplicated_message_callback(&self, callback: Arc<dyn DuplicatedMessageCallback>) {
        *self.inner.duplicate_callback.write().unwrap() = Some(callback);
    }

    /// Transactions currently tracked by the per-endpoint queues.
    pub fn number_of_transactions(&self) -> usize {
        self.inner.transactions.number_of_transactions()
    }

    /// Transactions awaiting a separate response.
    pub fn number_of_delayed_transactions(&self) -> usize {
        self.inner.delayed.len()
    }

    /// Block size used to trim oversized notifications, when configured.
    pub fn block_size(&self) -> Option<BlockSize> {
        self.inner.config.block_size
    }

    /// Sends a request and resolves with its response.
    ///
    /// A confirmable request is queued per endpoint, retransmitted on the
    /// standard schedule and correlated by message id (piggyback) or token
    /// (separate response). A non-confirmable request is sent immediately
    /// and correlated by token within the delayed-transaction window.
    pub async fn make_request(&self, packet: CoapPacket) -> Result<CoapPacket> {
        self.make_request_with_context(packet, TransportContext::NULL).await
    }

    pub async fn make_request_with_context(
        &self,
        packet: CoapPacket,
        context: TransportContext,
    ) -> Result<CoapPacket> {
        let priority = self.inner.config.default_priority;
        self.request_with(packet, context, priority, false).await
    }

    /// Request with explicit priority and admission control. `force_admit`
    /// bypasses the per-endpoint queue cap; block-wise follow-ups use it to
    /// guarantee in-order completion.
    pub async fn make_priority_request(
        &self,
        packet: CoapPacket,
        context: TransportContext,
        priority: Priority,
        force_admit: bool,
    ) -> Result<CoapPacket> {
        self.request_with(packet, context, priority, force_admit).await
    }

    async fn request_with(
        &self,
        packet: CoapPacket,
        context: TransportContext,
        priority: Priority,
        force_admit: bool,
    ) -> Result<CoapPacket> {
        let (sender, receiver) = oneshot::channel();
        let callback: ResponseCallback = Box::new(move |result| {
            let _ = sender.send(result);
        });
        self.make_request_internal(packet, callback, context, priority, force_admit)
            .await?;
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(CoapError::Shutdown),
        }
    }

    /// Callback-style request entry used by the observe machinery.
    pub(crate) async fn make_request_with_callback(
        &self,
        packet: CoapPacket,
        callback: ResponseCallback,
        priority: Priority,
        force_admit: bool,
    ) -> Result<()> {
        self.make_request_internal(packet, callback, TransportContext::NULL, priority, force_admit)
            .await
    }

    async fn make_request_internal(
        &self,
        mut packet: CoapPacket,
        callback: ResponseCallback,
        context: TransportContext,
        priority: Priority,
        force_admit: bool,
    ) -> Result<()> {
        packet.set_message_id(self.inner.mid.next_mid());

        if packet.must_acknowledge() {
            let trans = CoapTransaction::new(
                packet,
                callback,
                context,
                priority,
                &self.inner.config.transmission,
            );
            let id = trans.id;
            trace!(id = %id, force_admit, "adding transaction");
            if self
                .inner
                .transactions
                .add_transaction_and_get_ready_to_send(trans, force_admit)?
            {
                if let Err(err) = self.transmit_in_flight(&id).await {
                    // the caller gets the error; the callback never fires
                    let _ = self.inner.transactions.remove_and_lock(&id);
                    self.promote_next(&id).await;
                    return Err(err);
                }
            }
            Ok(())
        } else {
            // no piggyback response possible; correlate by token only
            if packet.token().is_empty() {
                warn!(remote = %packet.remote(), "sending NON request without token");
            }
            let mut trans = CoapTransaction::new(
                packet.clone(),
                callback,
                context.clone(),
                priority,
                &self.inner.config.transmission,
            );
            trans.arm_deadline(Instant::now() + self.inner.config.delayed_transaction_timeout);
            let delayed_id = trans.delayed_id();
            self.inner.delayed.add(delayed_id.clone(), trans);

            let remote = packet.remote();
            if let Err(err) = self.inner.transport.send(&packet, remote, &context).await {
                self.inner.delayed.remove(&delayed_id);
                return Err(err.into());
            }
            debug!(%remote, "CoAP sent [{}]", packet);
            Ok(())
        }
    }

    /// Fire-and-forget send used for non-confirmable notifications and
    /// termination resets; assigns a fresh message id.
    pub(crate) async fn send_notification(&self, mut packet: CoapPacket) -> Result<()> {
        packet.set_message_id(self.inner.mid.next_mid());
        let remote = packet.remote();
        self.inner
            .transport
            .send(&packet, remote, &TransportContext::NULL)
            .await?;
        debug!(%remote, "CoAP sent [{}]", packet);
        Ok(())
    }

    /// Sends one outbound message, assigning a fresh message id to
    /// non-confirmable ones. Returns the packet as actually sent.
    async fn send_message(
        &self,
        mut packet: CoapPacket,
        context: &TransportContext,
    ) -> Result<CoapPacket> {
        if packet.message_type() == MessageType::NonConfirmable {
            packet.set_message_id(self.inner.mid.next_mid());
        }
        let remote = packet.remote();
        self.inner.transport.send(&packet, remote, context).await?;
        debug!(%remote, "CoAP sent [{}]", packet);
        Ok(packet)
    }

    /// Transmits the in-flight transaction for `id`, recording the attempt.
    /// A transaction that vanished in the meantime (response raced us) is
    /// not an error.
    async fn transmit_in_flight(&self, id: &TransactionId) -> Result<()> {
        let Some(job) = self.inner.transactions.prepare_send(id, Instant::now()) else {
            return Ok(());
        };
        trace!(id = %id, "sending transaction");
        self.inner
            .transport
            .send(&job.packet, job.remote, &job.context)
            .await?;
        debug!(remote = %job.remote, "CoAP sent [{}]", job.packet);
        Ok(())
    }

    /// Releases the endpoint slot for `id` and transmits the next queued
    /// transaction. A queued transaction whose send fails is completed with
    /// the error and the one after it is tried.
    async fn promote_next(&self, id: &TransactionId) {
        let mut current = *id;
        loop {
            let Some(next) = self.inner.transactions.unlock_or_remove_and_get_next(&current)
            else {
                break;
            };
            match self.transmit_in_flight(&next).await {
                Ok(()) => break,
                Err(err) => {
                    debug!(id = %next, error = %err, "promoted transaction failed to send");
                    if let Some(trans) = self.inner.transactions.remove_and_lock(&next) {
                        trans.complete(Err(err));
                    }
                    current = next;
                }
            }
        }
    }

    fn start_tick_worker(&self) {
        let server = self.clone();
        let period = self.inner.config.tick_period;
        let worker = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                server.resend_timeouts().await;
            }
        });
        *self.inner.tick_worker.lock().unwrap() = Some(worker);
    }

    /// One pass of the periodic worker: retransmit or fail timed-out
    /// transactions, expire delayed transactions, advance cache eviction.
    async fn resend_timeouts(&self) {
        let now = Instant::now();

        for id in self.inner.transactions.find_timeout_transactions(now) {
            match self.inner.transactions.prepare_resend(&id, now) {
                Some(Resend::Job(job)) => {
                    trace!(id = %id, "retransmitting");
                    if let Err(err) = self
                        .inner
                        .transport
                        .send(&job.packet, job.remote, &job.context)
                        .await
                    {
                        warn!(id = %id, error = %err, "retransmission failed");
                        if let Some(trans) = self.inner.transactions.remove_and_lock(&id) {
                            trans.complete(Err(err.into()));
                        }
                        self.promote_next(&id).await;
                    }
                }
                Some(Resend::Exhausted) => {
                    trace!(id = %id, "transaction final timeout");
                    if let Some(trans) = self.inner.transactions.remove_and_lock(&id) {
                        trans.complete(Err(CoapError::Timeout));
                    }
                    self.promote_next(&id).await;
                }
                None => {}
            }
        }

        for delayed_id in self.inner.delayed.find_timeout_transactions(now) {
            if let Some(trans) = self.inner.delayed.remove(&delayed_id) {
                trace!(id = %delayed_id, "delayed transaction timeout");
                trans.complete(Err(CoapError::Timeout));
            }
        }

        if let Some(detector) = &self.inner.dedup {
            detector.evict_stale(now);
        }
    }

    async fn handle_ping(&self, packet: &CoapPacket) -> bool {
        if !packet.is_empty_message() || packet.message_type() != MessageType::Confirmable {
            return false;
        }
        debug!(remote = %packet.remote(), "CoAP ping received");
        if let Some(mut reset) = packet.create_response() {
            reset.set_message_type(MessageType::Reset);
            match self.send_message(reset, &TransportContext::NULL).await {
                Ok(sent) => self.put_to_duplication_detector(packet, &sent),
                Err(err) => error!(error = %err, "could not answer ping"),
            }
        }
        true
    }

    async fn handle_request(&self, packet: &CoapPacket, context: &TransportContext) -> bool {
        if self.find_duplicate(packet, "CoAP request repeated").await {
            return true;
        }

        let error = 'handled: {
            let uri = match packet.headers().uri_path.as_deref() {
                Some(path) if !path.is_empty() => path.to_string(),
                _ => "/".to_string(),
            };
            let Some(coap_handler) = self.inner.router.find(&uri) else {
                break 'handled Some((Code::NotFound, None));
            };

            if self.inner.config.critical_option_test {
                if let Err(err) = packet.headers().critical_option_check() {
                    break 'handled Some((Code::BadOption, Some(err.to_string())));
                }
            }

            let mut exchange = CoapExchange::for_request(packet.clone(), context.clone());
            match coap_handler.handle(&mut exchange).await {
                Ok(()) => {
                    let (request, response, response_context) = exchange.into_parts();
                    if let Some(response) = response {
                        self.send_response(&request, response, &response_context).await;
                    }
                    None
                }
                Err(CoapError::Code { code, payload }) => Some((code, payload)),
                Err(err) => {
                    warn!(%uri, error = %err, "request handler failed");
                    Some((Code::InternalServerError, None))
                }
            }
        };

        if let Some((code, payload)) = error {
            if let Some(mut response) = packet.create_response_with_code(Some(code)) {
                if let Some(payload) = payload {
                    response.set_payload(payload);
                }
                self.send_response(packet, response, &TransportContext::NULL).await;
            }
        }
        true
    }

    /// Sends a response and records it for duplicate replay.
    async fn send_response(
        &self,
        request: &CoapPacket,
        response: CoapPacket,
        context: &TransportContext,
    ) {
        match self.send_message(response, context).await {
            Ok(sent) => self.put_to_duplication_detector(request, &sent),
            Err(err) => warn!(remote = %request.remote(), error = %err, "could not send response"),
        }
    }

    async fn handle_response(&self, packet: &CoapPacket) -> bool {
        let id = TransactionId::of(packet);
        let mut maybe_trans = self.inner.transactions.remove_and_lock(&id);
        if maybe_trans.is_none()
            && matches!(
                packet.message_type(),
                MessageType::Confirmable | MessageType::NonConfirmable
            )
        {
            maybe_trans = self
                .inner
                .transactions
                .find_match_and_remove_for_separate_response(packet);
        }

        match maybe_trans {
            Some(trans) => {
                self.dispatch_response(trans, packet).await;
                true
            }
            None => false,
        }
    }

    async fn dispatch_response(&self, trans: CoapTransaction, packet: &CoapPacket) {
        if packet.code().is_some() || packet.message_type() == MessageType::Reset {
            self.complete_and_promote(trans, Ok(packet.clone())).await;
            return;
        }

        if packet.message_type() == MessageType::Acknowledgement && packet.is_empty_message() {
            if trans.packet.method().is_none() {
                // empty ACK settling an outbound response or notification
                self.complete_and_promote(trans, Ok(packet.clone())).await;
            } else if !trans.packet.token().is_empty() {
                // the peer will respond separately; re-key by token
                let id = trans.id;
                let delayed_id = trans.delayed_id();
                let mut trans = trans;
                trans.arm_deadline(
                    Instant::now() + self.inner.config.delayed_transaction_timeout,
                );
                trace!(id = %id, delayed = %delayed_id, "transaction moved to delayed");
                self.promote_next(&id).await;
                self.inner.delayed.add(delayed_id, trans);
            } else {
                error!(id = %trans.id, "empty ACK for a request without token");
                self.complete_and_promote(
                    trans,
                    Err(CoapError::Protocol(
                        "empty ACK for a request without token".to_string(),
                    )),
                )
                .await;
            }
            return;
        }

        error!(id = %trans.id, "unhandled response form [{}]", packet);
        self.complete_and_promote(
            trans,
            Err(CoapError::Protocol("unhandled response form".to_string())),
        )
        .await;
    }

    /// Callback first, then promotion: a callback that immediately queues a
    /// follow-up request (block-wise transfer) must see it scheduled after
    /// the transaction it just completed.
    async fn complete_and_promote(&self, trans: CoapTransaction, result: Result<CoapPacket>) {
        let id = trans.id;
        trans.complete(result);
        self.promote_next(&id).await;
    }

    async fn handle_delayed_response(&self, packet: &CoapPacket) -> bool {
        let delayed_id = DelayedTransactionId::new(packet.token().clone(), packet.remote());
        let Some(trans) = self.inner.delayed.remove(&delayed_id) else {
            return false;
        };

        if packet.must_acknowledge() {
            if let Some(ack) = packet.create_response() {
                match self.send_message(ack, &TransportContext::NULL).await {
                    Ok(sent) => self.put_to_duplication_detector(packet, &sent),
                    Err(err) => error!(error = %err, "could not acknowledge separate response"),
                }
            }
        }
        trans.complete(Ok(packet.clone()));
        true
    }

    async fn handle_observation(&self, packet: &CoapPacket, context: &TransportContext) -> bool {
        let handler = self.inner.observation_handler.read().unwrap().clone();
        let has_observation = handler
            .as_ref()
            .is_some_and(|handler| handler.has_observation(packet.token()));
        if packet.headers().observe.is_none() && !has_observation {
            return false;
        }
        let Some(handler) = handler else {
            return false;
        };

        let terminated = packet.message_type() == MessageType::Reset
            || packet.headers().observe.is_none()
            || !matches!(packet.code(), Some(Code::Content) | Some(Code::Valid));
        if terminated {
            trace!("observation termination [{}]", packet);
            let error = CoapError::ObservationTerminated {
                remote: packet.remote(),
                packet: Box::new(packet.clone()),
            };
            handler.observation_terminated(error, context.clone()).await;
            return true;
        }

        if !self.find_duplicate(packet, "CoAP notification repeated").await {
            trace!(remote = %packet.remote(), "notification [{}]", packet);
            let mut exchange = CoapExchange::for_notification(packet.clone(), context.clone());
            handler.notification(&mut exchange).await;
            let (notification, response, response_context) = exchange.into_parts();
            if let Some(response) = response {
                match self.send_message(response, &response_context).await {
                    Ok(sent) => self.put_to_duplication_detector(&notification, &sent),
                    Err(err) => warn!(error = %err, "could not acknowledge notification"),
                }
            }
        }
        true
    }

    async fn handle_not_processed(&self, packet: &CoapPacket) {
        if let Some(mut reset) = packet.create_response() {
            reset.set_message_type(MessageType::Reset);
            if packet.message_type() == MessageType::NonConfirmable {
                reset.set_message_id(self.inner.mid.next_mid());
            }
            match self.send_message(reset, &TransportContext::NULL).await {
                Ok(sent) => {
                    self.put_to_duplication_detector(packet, &sent);
                    warn!("can not process message [{}], sent reset", packet);
                }
                Err(err) => error!(error = %err, "could not send reset"),
            }
            return;
        }

        if packet.message_type() == MessageType::Acknowledgement {
            debug!("discarding extra ACK [{}]", packet);
        } else {
            warn!("can not process message [{}]", packet);
        }
    }

    /// Consults the duplicate detector. `true` means the message was seen
    /// before and has been dealt with (silently, or by replaying the cached
    /// response).
    async fn find_duplicate(&self, packet: &CoapPacket, log_message: &str) -> bool {
        let Some(detector) = &self.inner.dedup else {
            return false;
        };
        match detector.observe(packet) {
            DuplicateState::FirstSeen => false,
            DuplicateState::PendingResponse => {
                debug!("{}, no response available [{}]", log_message, packet);
                self.notify_duplicate(packet);
                true
            }
            DuplicateState::Replied(response) => {
                debug!("{}, resending response [{}]", log_message, packet);
                if let Err(err) = self
                    .inner
                    .transport
                    .send(&response, packet.remote(), &TransportContext::NULL)
                    .await
                {
                    error!(error = %err, "could not replay cached response");
                }
                self.notify_duplicate(packet);
                true
            }
        }
    }

    fn notify_duplicate(&self, packet: &CoapPacket) {
        let callback = self.inner.duplicate_callback.read().unwrap().clone();
        if let Some(callback) = callback {
            callback.duplicated(packet);
        }
    }

    fn put_to_duplication_detector(&self, request: &CoapPacket, response: &CoapPacket) {
        if let Some(detector) = &self.inner.dedup {
            detector.put_response(request, response);
        }
    }
}

#[async_trait]
impl CoapReceiver for CoapServer {
    async fn handle(&self, packet: CoapPacket, context: TransportContext) {
        if self.handle_ping(&packet).await {
            return;
        }
        debug!(remote = %packet.remote(), "CoAP received [{}]", packet);

        let processed = if packet.method().is_some() {
            self.handle_request(&packet, &context).await
        } else {
            self.handle_response(&packet).await
                || self.handle_delayed_response(&packet).await
                || self.handle_observation(&packet, &context).await
        };

        if !processed {
            self.handle_not_processed(&packet).await;
        }
    }
}
