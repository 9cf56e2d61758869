use crate::dispatch::{Dispatcher, FlushAfter, RouteAction, SubscriberCallback, SubscriptionId};
use crate::error::Result;
use crate::infrastructure::connection::Connector;
use crate::infrastructure::websocket::WebSocketConnector;
use crate::reconnect::{BackoffConfig, LiveStatus, ReconnectController};
use crate::transport::{Transport, TransportEvent};
use pitwall_core::domain::{
    ComparisonCoordinator, ComparisonRequestEvent, Driver, DriverId, HandoffCoordinator,
    ParticipantRegistry, SessionId, TelemetrySample,
};
use pitwall_core::protocol::{
    decode_payload, encode_payload, Channel, ChannelPayload, Frame, SwitchDriver, TransportKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Client configuration; `ClientConfig::new(url)` gives working defaults
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub token: Option<String>,
    pub transport: TransportKind,
    /// Minimum spacing between deliveries on high-frequency channels
    pub throttle_interval: Duration,
    pub backoff: BackoffConfig,
    /// Unanswered comparison requests older than this are pruned
    pub comparison_ttl: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ClientConfig {
            url: url.into(),
            token: None,
            transport: TransportKind::Framed,
            throttle_interval: Duration::from_millis(100),
            backoff: BackoffConfig::default(),
            comparison_ttl: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.transport = kind;
        self
    }
}

/// State shared between the facade and the event loop
struct ClientShared {
    dispatcher: Dispatcher,
    registry: ParticipantRegistry,
    handoffs: HandoffCoordinator,
    comparisons: ComparisonCoordinator,
    transport: Option<Transport>,
    session: Option<SessionId>,
    flush_tasks: HashMap<Channel, JoinHandle<()>>,
}

impl ClientShared {
    /// Best-effort frame send; a send with no live transport is dropped
    /// with a warning
    fn send(&mut self, frame: &Frame) -> bool {
        match self.transport.as_mut() {
            Some(transport) => transport.send(frame),
            None => {
                warn!(frame = frame.name(), "dropping outbound frame, not connected");
                false
            }
        }
    }

    fn send_payload(&mut self, payload: &ChannelPayload) -> Result<bool> {
        let (channel, value) = encode_payload(payload)?;
        Ok(self.send(&Frame::publish(channel, value)))
    }

    /// Apply domain effects of one inbound publish and route it. Payloads
    /// that fail validation or carry unattributable correlation ids never
    /// reach a callback. The returned delivery is run by the caller after
    /// the shared-state lock is released.
    fn handle_publish(&mut self, channel: Channel, data: Value, now: Instant) -> Option<RouteAction> {
        let payload = match decode_payload(channel, data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%channel, error = %e, "dropping invalid inbound payload");
                return None;
            }
        };

        match &payload {
            ChannelPayload::DriverList(list) => {
                self.registry.set_participants(list.clone());
            }
            ChannelPayload::DriverUpdate(patch) => {
                if let Err(e) = self.registry.upsert(patch) {
                    warn!(error = %e, "driver update rejected");
                    return None;
                }
            }
            ChannelPayload::SwitchDriver(switch) => {
                if let Err(e) = self.registry.set_active(&switch.driver_id) {
                    warn!(error = %e, "switch to unknown driver ignored");
                }
            }
            ChannelPayload::HandoffRequest(event) | ChannelPayload::HandoffResponse(event) => {
                match self.handoffs.apply_remote(event) {
                    Ok(Some(new_active)) => {
                        if let Err(e) = self.registry.set_active(&new_active) {
                            warn!(error = %e, "completed handoff names unknown driver");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "handoff event rejected");
                        return None;
                    }
                }
            }
            ChannelPayload::ComparisonResult(event) => {
                if self.comparisons.on_result(event).is_err() {
                    // Malformed correlation id; already logged
                    return None;
                }
            }
            _ => {}
        }

        self.dispatcher.route(payload, now)
    }
}

/// Realtime session client: one connection, channel pub/sub with
/// high-frequency throttling, participant roster, handoff and comparison
/// coordination, automatic reconnection.
///
/// All methods are callable from any thread; the facade shares state with a
/// background event loop over a mutex.
pub struct PitwallClient {
    config: ClientConfig,
    shared: Arc<Mutex<ClientShared>>,
    connector: Arc<dyn Connector>,
    status_tx: watch::Sender<LiveStatus>,
    retry: Arc<Notify>,
    shutdown: Arc<Notify>,
    event_loop: Option<JoinHandle<()>>,
}

impl PitwallClient {
    pub fn new(config: ClientConfig) -> Self {
        let connector = Arc::new(WebSocketConnector::new(
            config.url.clone(),
            config.token.clone(),
        ));
        Self::with_connector(config, connector)
    }

    /// Construct over a custom connector (in-memory connections in tests)
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let shared = Arc::new(Mutex::new(ClientShared {
            dispatcher: Dispatcher::new(config.throttle_interval),
            registry: ParticipantRegistry::new(),
            handoffs: HandoffCoordinator::new(),
            comparisons: ComparisonCoordinator::new(),
            transport: None,
            session: None,
            flush_tasks: HashMap::new(),
        }));
        let (status_tx, _) = watch::channel(LiveStatus::Off);

        PitwallClient {
            config,
            shared,
            connector,
            status_tx,
            retry: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            event_loop: None,
        }
    }

    /// Observe connection lifecycle transitions
    pub fn status(&self) -> watch::Receiver<LiveStatus> {
        self.status_tx.subscribe()
    }

    /// Start the event loop: connect, poll, reconnect with backoff on loss.
    /// Idempotent while the loop is running.
    #[instrument(skip(self), fields(url = %self.config.url))]
    pub fn connect(&mut self) {
        if self.event_loop.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("event loop already running");
            return;
        }

        info!("starting client");
        // A permit left on the notifier by a disconnect that aborted the
        // previous loop before it was polled must not stop this one
        self.shutdown = Arc::new(Notify::new());
        let loop_task = EventLoop {
            shared: self.shared.clone(),
            connector: self.connector.clone(),
            kind: self.config.transport,
            status_tx: self.status_tx.clone(),
            retry: self.retry.clone(),
            shutdown: self.shutdown.clone(),
            reconnect: ReconnectController::new(self.config.backoff.clone()),
            comparison_ttl: self.config.comparison_ttl,
        };
        self.event_loop = Some(tokio::spawn(loop_task.run()));
    }

    /// Skip any pending backoff delay and reconnect immediately
    pub fn retry_now(&self) {
        self.retry.notify_one();
    }

    /// Stop the event loop and tear the connection down
    pub fn disconnect(&mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.event_loop.take() {
            task.abort();
        }

        let mut shared = lock(&self.shared);
        if let Some(mut transport) = shared.transport.take() {
            transport.close();
        }
        for (_, task) in shared.flush_tasks.drain() {
            task.abort();
        }
        self.status_tx.send_replace(LiveStatus::Off);
        info!("client stopped");
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared)
            .transport
            .as_ref()
            .is_some_and(Transport::is_connected)
    }

    /// Register a callback for a channel; the returned handle is the only
    /// way to unsubscribe it
    pub fn subscribe(&self, channel: Channel, callback: SubscriberCallback) -> SubscriptionId {
        lock(&self.shared).dispatcher.subscribe(channel, callback)
    }

    pub fn unsubscribe(&self, channel: Channel, id: SubscriptionId) -> bool {
        let mut shared = lock(&self.shared);
        let removed = shared.dispatcher.unsubscribe(channel, id);
        if !shared.dispatcher.has_throttle_state(channel) {
            // Last subscriber gone: cancel any armed flush timer with the
            // throttle state
            if let Some(task) = shared.flush_tasks.remove(&channel) {
                task.abort();
            }
        }
        removed
    }

    /// Join a session's broadcast group. The membership is remembered and
    /// re-announced after every reconnect.
    pub fn join_session(&self, session_id: impl Into<SessionId>) {
        let session_id = session_id.into();
        let mut shared = lock(&self.shared);
        shared.send(&Frame::join(session_id.clone()));
        shared.session = Some(session_id);
    }

    pub fn leave_session(&self) {
        let mut shared = lock(&self.shared);
        if let Some(session_id) = shared.session.take() {
            shared.send(&Frame::leave(session_id));
        }
    }

    /// Publish a payload on its channel. Returns whether the frame went out;
    /// sends while disconnected are dropped, not queued.
    pub fn publish(&self, payload: &ChannelPayload) -> Result<bool> {
        lock(&self.shared).send_payload(payload)
    }

    /// Fire-and-forget telemetry sample
    pub fn publish_telemetry(&self, sample: &TelemetrySample) -> Result<bool> {
        let value = serde_json::to_value(sample)?;
        lock(&self.shared).send_payload(&ChannelPayload::Telemetry(value))
    }

    /// Initiate a driver handoff. Participants are validated locally before
    /// anything reaches the wire.
    pub fn request_handoff(
        &self,
        from: impl Into<DriverId>,
        to: impl Into<DriverId>,
        notes: Option<String>,
    ) -> Result<Uuid> {
        let mut shared = lock(&self.shared);
        let request = shared.handoffs.initiate(from, to, notes)?;
        let event = request.to_event();
        shared.send_payload(&ChannelPayload::HandoffRequest(event))?;
        Ok(request.id())
    }

    /// Accept a pending handoff (target side)
    pub fn confirm_handoff(&self, id: Uuid) -> Result<()> {
        let mut shared = lock(&self.shared);
        let event = shared.handoffs.confirm(id)?.to_event();
        shared.send_payload(&ChannelPayload::HandoffResponse(event))?;
        Ok(())
    }

    /// Back out of a pending handoff
    pub fn cancel_handoff(&self, id: Uuid) -> Result<()> {
        let mut shared = lock(&self.shared);
        let event = shared.handoffs.cancel(id)?.to_event();
        shared.send_payload(&ChannelPayload::HandoffResponse(event))?;
        Ok(())
    }

    /// Complete a confirmed handoff, moving the active-driver pointer
    pub fn complete_handoff(&self, id: Uuid) -> Result<()> {
        let mut shared = lock(&self.shared);
        let new_active = shared.handoffs.complete(id)?;
        if let Err(e) = shared.registry.set_active(&new_active) {
            warn!(error = %e, "completed handoff names unknown driver");
        }
        let event = shared
            .handoffs
            .get(id)
            .map(|r| r.to_event())
            .ok_or(pitwall_core::domain::HandoffError::UnknownRequest(id))?;
        shared.send_payload(&ChannelPayload::HandoffResponse(event))?;
        Ok(())
    }

    /// Request a metric comparison between two participants, returning the
    /// correlation id the result will carry
    pub fn request_comparison(
        &self,
        driver_a: impl Into<DriverId>,
        driver_b: impl Into<DriverId>,
    ) -> Result<String> {
        let mut shared = lock(&self.shared);
        let driver_a = driver_a.into();
        let driver_b = driver_b.into();
        let comparison_id = shared
            .comparisons
            .request(driver_a.clone(), driver_b.clone())?;
        shared.send_payload(&ChannelPayload::RequestComparison(ComparisonRequestEvent {
            comparison_id: comparison_id.clone(),
            driver_a,
            driver_b,
        }))?;
        Ok(comparison_id)
    }

    /// Make a driver active locally and announce the switch
    pub fn switch_driver(&self, driver_id: impl Into<DriverId>) -> Result<()> {
        let mut shared = lock(&self.shared);
        let driver_id = driver_id.into();
        shared.registry.set_active(&driver_id)?;
        shared.send_payload(&ChannelPayload::SwitchDriver(SwitchDriver {
            driver_id,
            initiated_by: None,
        }))?;
        Ok(())
    }

    /// Snapshot of the current roster
    pub fn drivers(&self) -> Vec<Driver> {
        lock(&self.shared).registry.drivers().to_vec()
    }

    pub fn active_driver(&self) -> Option<DriverId> {
        lock(&self.shared).registry.active().cloned()
    }
}

impl Drop for PitwallClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock(shared: &Arc<Mutex<ClientShared>>) -> MutexGuard<'_, ClientShared> {
    // A panicked subscriber cannot corrupt state; recover the guard
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background task: connect, poll the transport, apply inbound frames,
/// reconnect with exponential backoff on loss
struct EventLoop {
    shared: Arc<Mutex<ClientShared>>,
    connector: Arc<dyn Connector>,
    kind: TransportKind,
    status_tx: watch::Sender<LiveStatus>,
    retry: Arc<Notify>,
    shutdown: Arc<Notify>,
    reconnect: ReconnectController,
    comparison_ttl: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const EXPIRY_INTERVAL: Duration = Duration::from_secs(5);

impl EventLoop {
    async fn run(mut self) {
        'outer: loop {
            self.reconnect.on_connecting();
            self.status_tx.send_replace(LiveStatus::Connecting);

            let connection = match self.connector.connect().await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(error = %e, "connect attempt failed");
                    if !self.wait_backoff().await {
                        break 'outer;
                    }
                    continue 'outer;
                }
            };

            self.reconnect.on_connected();
            self.status_tx.send_replace(LiveStatus::Connected);
            {
                let mut shared = lock(&self.shared);
                shared.transport = Some(Transport::new(connection, self.kind));
                // Re-announce session membership after a reconnect
                if let Some(session_id) = shared.session.clone() {
                    shared.send(&Frame::join(session_id));
                }
            }

            let mut poll = tokio::time::interval(POLL_INTERVAL);
            let mut expiry = tokio::time::interval(EXPIRY_INTERVAL);
            let shutdown = self.shutdown.clone();
            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if self.poll_transport() {
                            continue;
                        }
                        // Link lost
                        lock(&self.shared).transport = None;
                        self.status_tx.send_replace(LiveStatus::Connecting);
                        if !self.wait_backoff().await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    _ = expiry.tick() => {
                        lock(&self.shared).comparisons.expire(self.comparison_ttl);
                    }
                    _ = shutdown.notified() => break 'outer,
                }
            }
        }

        if self.reconnect.status() != LiveStatus::GaveUp {
            self.status_tx.send_replace(LiveStatus::Off);
        }
    }

    /// Drain one poll tick. Returns false when the link is gone.
    ///
    /// Subscriber callbacks run after the shared-state lock is released; a
    /// callback is free to re-enter the client.
    fn poll_transport(&self) -> bool {
        let mut deliveries = Vec::new();
        let mut flushes = Vec::new();
        let mut link_up = true;
        {
            let mut shared = lock(&self.shared);
            let Some(mut transport) = shared.transport.take() else {
                return false;
            };

            let now = Instant::now();
            for event in transport.poll() {
                match event {
                    TransportEvent::Connected => {}
                    TransportEvent::Disconnected => link_up = false,
                    TransportEvent::Frame(Frame::Publish { channel, data }) => {
                        match shared.handle_publish(channel, data, now) {
                            Some(RouteAction::Deliver(delivery)) => deliveries.push(delivery),
                            Some(RouteAction::Schedule(flush)) => flushes.push(flush),
                            None => {}
                        }
                    }
                    TransportEvent::Frame(frame) => {
                        debug!(frame = frame.name(), "ignoring server-bound control frame");
                    }
                }
            }

            link_up = link_up && transport.is_connected();
            shared.transport = Some(transport);
        }

        for delivery in deliveries {
            delivery.run();
        }
        for flush in flushes {
            self.schedule_flush(flush);
        }
        link_up
    }

    /// Arm the trailing-edge flush timer for a throttled channel
    fn schedule_flush(&self, flush: FlushAfter) {
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(flush.delay).await;
            let delivery = {
                let mut shared = lock(&shared);
                let delivery = shared.dispatcher.flush_due(flush.channel, Instant::now());
                shared.flush_tasks.remove(&flush.channel);
                delivery
            };
            // Lock released before the callbacks run
            if let Some(delivery) = delivery {
                delivery.run();
            }
        });
        lock(&self.shared).flush_tasks.insert(flush.channel, task);
    }

    /// Sleep out the backoff delay, unless skipped or shut down. Returns
    /// false when the loop should stop.
    async fn wait_backoff(&mut self) -> bool {
        let Some(delay) = self.reconnect.on_loss() else {
            self.status_tx.send_replace(LiveStatus::GaveUp);
            return false;
        };
        self.status_tx.send_replace(self.reconnect.status());

        let retry = self.retry.clone();
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = retry.notified() => {
                info!("skipping backoff, retrying now");
                self.reconnect.retry_now();
                true
            }
            _ = shutdown.notified() => false,
        }
    }
}
