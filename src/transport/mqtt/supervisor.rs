//! Connection supervisor for the single broker session
//!
//! Owns the rumqttc client and its event loop, serializes state transitions,
//! and implements the retry contract for publishing while disconnected. The
//! event loop runs on a spawned task; it reports observed transitions
//! (ConnAck, broker disconnect, transport errors) through the supervisor's
//! state channel and forwards inbound publishes to the attached dispatcher.

use super::connection::{configure_mqtt_options, ConnectionState, ReconnectPolicy};
use super::events::{route_event, EventRoute};
use crate::config::{BrokerConfig, BrokerEndpoint};
use crate::error::{ConnectionError, PublishError, SubscriptionError};
use crate::transport::{InboundMessage, QoS, Session, DEFAULT_QOS};
use rumqttc::{AsyncClient, EventLoop, Publish};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `disconnect` waits for the event-loop task to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Supervises the one connection a client instance holds to its broker.
///
/// Constructed from a [`BrokerConfig`]; the client identity is generated once
/// (or supplied) and reused across reconnects so the broker can recognize
/// session continuity. All methods take `&self`; connect/disconnect
/// transitions are serialized internally.
pub struct MqttSupervisor {
    endpoint: BrokerEndpoint,
    client_id: String,
    policy: StdMutex<ReconnectPolicy>,
    client: Arc<Mutex<Option<AsyncClient>>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    transition_gate: Mutex<()>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: StdMutex<Option<watch::Sender<bool>>>,
    subscribed: Arc<Mutex<Vec<(String, QoS)>>>,
    pending_acks: Arc<Mutex<HashMap<u16, Publish>>>,
    dispatcher: Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
    next_message_id: AtomicU32,
}

/// Everything the event-loop task needs, cloned out of the supervisor.
struct EventLoopContext {
    endpoint: String,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    client: Arc<Mutex<Option<AsyncClient>>>,
    subscribed: Arc<Mutex<Vec<(String, QoS)>>>,
    pending_acks: Arc<Mutex<HashMap<u16, Publish>>>,
    dispatcher: Arc<StdMutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MqttSupervisor {
    /// Create a supervisor with a generated client identity.
    pub fn new(config: &BrokerConfig) -> Result<Self, ConnectionError> {
        let client_id = format!("mqttlink-{}", uuid::Uuid::new_v4());
        Self::with_client_id(config, client_id)
    }

    /// Create a supervisor with a caller-supplied client identity.
    pub fn with_client_id(
        config: &BrokerConfig,
        client_id: impl Into<String>,
    ) -> Result<Self, ConnectionError> {
        let client_id = client_id.into();
        let endpoint = config.endpoint();
        // Fail configuration problems here rather than on first connect
        configure_mqtt_options(&client_id, &endpoint)?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            endpoint,
            client_id,
            policy: StdMutex::new(config.reconnect_policy()),
            client: Arc::new(Mutex::new(None)),
            state_tx,
            state_rx,
            transition_gate: Mutex::new(()),
            loop_handle: Mutex::new(None),
            shutdown_tx: StdMutex::new(None),
            subscribed: Arc::new(Mutex::new(Vec::new())),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: Arc::new(StdMutex::new(None)),
            next_message_id: AtomicU32::new(0),
        })
    }

    /// The stable client identity presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The endpoint this supervisor connects to.
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// The reconnect policy currently in effect.
    pub fn active_policy(&self) -> ReconnectPolicy {
        *self
            .policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store_policy(&self, policy: ReconnectPolicy) {
        *self
            .policy
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = policy;
    }

    fn next_message_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connect using the configured reconnect policy.
    ///
    /// Failure to reach the broker is returned, not panicked on: a missing
    /// broker at startup is recoverable, and the supervisor becomes usable
    /// once a later `connect` succeeds.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let policy = self.active_policy();
        self.connect_with(policy).await
    }

    /// Connect with an explicit reconnect policy, which stays in effect for
    /// subsequent publish retries.
    pub async fn connect_with(&self, policy: ReconnectPolicy) -> Result<(), ConnectionError> {
        let _gate = self.transition_gate.lock().await;
        self.store_policy(policy);

        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        {
            let mut handle_guard = self.loop_handle.lock().await;
            let loop_alive = handle_guard
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false);

            if !loop_alive {
                self.state_tx.send_replace(ConnectionState::Connecting);
                let options = configure_mqtt_options(&self.client_id, &self.endpoint)?;
                let (client, event_loop) = AsyncClient::new(options, 10);
                *self.client.lock().await = Some(client);

                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                *self
                    .shutdown_tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);

                let ctx = EventLoopContext {
                    endpoint: self.endpoint.to_string(),
                    policy,
                    state_tx: self.state_tx.clone(),
                    shutdown_rx,
                    client: self.client.clone(),
                    subscribed: self.subscribed.clone(),
                    pending_acks: self.pending_acks.clone(),
                    dispatcher: self.dispatcher.clone(),
                };
                *handle_guard = Some(tokio::spawn(run_event_loop(event_loop, ctx)));
            }
        }

        let wait = Self::wait_for_acknowledgment(
            self.state_rx.clone(),
            self.endpoint.to_string(),
            policy.connect_timeout(),
            policy.is_enabled(),
        )
        .await;

        match wait {
            Ok(()) => {
                info!(endpoint = %self.endpoint, client_id = %self.client_id, "connected to broker");
                Ok(())
            }
            Err(e) => {
                error!(endpoint = %self.endpoint, error = %e, "failed to connect to broker");
                if !policy.is_enabled() {
                    // No automatic recovery: tear the attempt down so
                    // Disconnected is a stable state.
                    self.stop_event_loop().await;
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Wait until the state channel reports an acknowledged connection.
    ///
    /// With reconnection enabled, intermediate Disconnected states are
    /// expected (the event loop retries on its own) and only the timeout
    /// ends the wait.
    async fn wait_for_acknowledgment(
        mut state_rx: watch::Receiver<ConnectionState>,
        endpoint: String,
        timeout: Duration,
        ride_through_disconnects: bool,
    ) -> Result<(), ConnectionError> {
        let timeout_ms = timeout.as_millis() as u64;
        let result = tokio::time::timeout(timeout, async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected if !ride_through_disconnects => {
                        return Err(ConnectionError::Unreachable {
                            endpoint: endpoint.clone(),
                        });
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(ConnectionError::Transport("state channel closed".into()));
                }
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ConnectionError::Timeout {
                endpoint,
                timeout_ms,
            }),
        }
    }

    /// Signal the event-loop task and wait briefly for it to finish.
    async fn stop_event_loop(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(true);
        }

        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => debug!("event loop task stopped"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "event loop task ended with error");
                }
                Err(_) => warn!("event loop task did not stop in time"),
                _ => {}
            }
        }
    }

    /// Gracefully close the session. Idempotent if already disconnected.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let _gate = self.transition_gate.lock().await;

        let loop_alive = self
            .loop_handle
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if !loop_alive && self.state() == ConnectionState::Disconnected {
            return Ok(());
        }

        if self.state() == ConnectionState::Connected {
            let client_guard = self.client.lock().await;
            if let Some(client) = client_guard.as_ref() {
                client
                    .disconnect()
                    .await
                    .map_err(|e| ConnectionError::Transport(Box::new(e)))?;
            }
        }

        self.stop_event_loop().await;
        *self.client.lock().await = None;
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!(endpoint = %self.endpoint, "disconnected from broker");
        Ok(())
    }

    /// Publish with the next message id and the default quality-of-service.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let message_id = self.next_message_id();
        self.publish_as(topic, payload, message_id, DEFAULT_QOS).await
    }

    /// Publish with an explicit message id and quality-of-service.
    ///
    /// While disconnected: with reconnection disabled this fails immediately;
    /// with reconnection enabled it waits, re-attempting the connection at
    /// the configured interval until the broker is back, then delivers once.
    /// The wait has no built-in upper bound and is not cancellable mid-wait;
    /// callers needing a bound must impose one externally (for example with
    /// `tokio::time::timeout`).
    pub async fn publish_as(
        &self,
        topic: &str,
        payload: &[u8],
        message_id: u32,
        qos: QoS,
    ) -> Result<(), PublishError> {
        if !self.is_connected() {
            let policy = self.active_policy();
            let Some(interval) = policy.interval() else {
                return Err(PublishError::NotConnected);
            };
            loop {
                match self.connect_with(policy).await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(
                            endpoint = %self.endpoint,
                            error = %e,
                            "broker unavailable, retrying before publish"
                        );
                        // A timed-out attempt already waited one interval.
                        if !matches!(e, ConnectionError::Timeout { .. }) {
                            tokio::time::sleep(interval).await;
                        }
                    }
                }
            }
        }

        self.transport_publish(topic, payload, message_id, qos).await
    }

    async fn transport_publish(
        &self,
        topic: &str,
        payload: &[u8],
        message_id: u32,
        qos: QoS,
    ) -> Result<(), PublishError> {
        let client_guard = self.client.lock().await;
        let Some(client) = client_guard.as_ref() else {
            return Err(PublishError::NotConnected);
        };

        client
            .publish(topic, qos.into(), false, payload.to_vec())
            .await
            .map_err(|e| PublishError::Delivery {
                topic: topic.to_string(),
                message_id,
                source: Box::new(e),
            })?;

        debug!(topic, message_id, qos = qos.as_u8(), "message handed to transport");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Session for MqttSupervisor {
    async fn subscribe(&self, pattern: &str, qos: QoS) -> Result<(), SubscriptionError> {
        if !self.is_connected() {
            return Err(SubscriptionError::NotConnected {
                pattern: pattern.to_string(),
            });
        }

        {
            let client_guard = self.client.lock().await;
            let Some(client) = client_guard.as_ref() else {
                return Err(SubscriptionError::NotConnected {
                    pattern: pattern.to_string(),
                });
            };
            client
                .subscribe(pattern, qos.into())
                .await
                .map_err(|e| SubscriptionError::Rejected {
                    pattern: pattern.to_string(),
                    source: Box::new(e),
                })?;
        }

        // Track for transparent re-subscription after connection recovery
        let mut subscribed = self.subscribed.lock().await;
        if !subscribed.iter().any(|(p, _)| p == pattern) {
            subscribed.push((pattern.to_string(), qos));
        }
        debug!(pattern, qos = qos.as_u8(), "subscribed");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        message_id: u32,
        qos: QoS,
    ) -> Result<(), PublishError> {
        self.publish_as(topic, payload, message_id, qos).await
    }

    async fn acknowledge(&self, message_id: u32, qos: QoS) -> Result<(), PublishError> {
        let Ok(packet_id) = u16::try_from(message_id) else {
            debug!(message_id, "no pending acknowledgment for message");
            return Ok(());
        };

        let pending = self.pending_acks.lock().await.remove(&packet_id);
        match pending {
            Some(publish) => {
                let client_guard = self.client.lock().await;
                let Some(client) = client_guard.as_ref() else {
                    return Err(PublishError::NotConnected);
                };
                client
                    .ack(&publish)
                    .await
                    .map_err(|e| PublishError::Acknowledge {
                        message_id,
                        source: Box::new(e),
                    })?;
                debug!(message_id, qos = qos.as_u8(), "acknowledged message");
                Ok(())
            }
            // QoS 0 deliveries have no acknowledgment on the wire
            None => {
                debug!(message_id, "no pending acknowledgment for message");
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_dispatcher(&self, sender: mpsc::Sender<InboundMessage>) {
        *self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }
}

impl Drop for MqttSupervisor {
    fn drop(&mut self) {
        // Best effort: stop the background task. Users should call
        // disconnect() for a graceful shutdown; this only prevents leaks.
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(true);
        }
        if let Ok(mut guard) = self.loop_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

/// The event-loop task: polls the transport, reports state transitions, and
/// forwards inbound messages until shut down or, with reconnection disabled,
/// until the first transport failure.
async fn run_event_loop(mut event_loop: EventLoop, mut ctx: EventLoopContext) {
    info!(endpoint = %ctx.endpoint, "transport event loop started");
    loop {
        tokio::select! {
            _ = ctx.shutdown_rx.changed() => {
                if *ctx.shutdown_rx.borrow() {
                    info!("shutdown signal received, stopping event loop");
                    break;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(event) => match route_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        info!(endpoint = %ctx.endpoint, "broker acknowledged connection");
                        ctx.state_tx.send_replace(ConnectionState::Connected);
                        resubscribe(&ctx).await;
                    }
                    EventRoute::MessageReceived(publish) => {
                        forward_inbound(&ctx, publish).await;
                    }
                    EventRoute::Disconnected => {
                        warn!(endpoint = %ctx.endpoint, "broker closed the session");
                        ctx.state_tx.send_replace(ConnectionState::Disconnected);
                        if !ctx.policy.is_enabled() {
                            break;
                        }
                    }
                    EventRoute::SubscriptionConfirmed { packet_id } => {
                        debug!(packet_id, "subscription confirmed");
                    }
                    EventRoute::Infrastructure(event) => {
                        debug!(event, "transport event");
                    }
                    EventRoute::Outgoing => {}
                },
                Err(e) => {
                    ctx.state_tx.send_replace(ConnectionState::Disconnected);
                    error!(endpoint = %ctx.endpoint, error = %e, "broker connection lost");
                    match ctx.policy.interval() {
                        // Recovery happens on the next poll; pace the attempts
                        Some(interval) => {
                            if !interruptible_sleep(ctx.shutdown_rx.clone(), interval).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }
    ctx.state_tx.send_replace(ConnectionState::Disconnected);
    info!(endpoint = %ctx.endpoint, "transport event loop stopped");
}

/// Re-issue tracked subscriptions after the broker acknowledged a session.
async fn resubscribe(ctx: &EventLoopContext) {
    let patterns = ctx.subscribed.lock().await.clone();
    if patterns.is_empty() {
        return;
    }
    let client_guard = ctx.client.lock().await;
    let Some(client) = client_guard.as_ref() else {
        return;
    };
    for (pattern, qos) in patterns {
        match client.subscribe(&pattern, qos.into()).await {
            Ok(()) => debug!(pattern = %pattern, "re-subscribed"),
            Err(e) => error!(pattern = %pattern, error = %e, "failed to re-subscribe"),
        }
    }
}

/// Stash the packet for later acknowledgment and hand the message to the
/// dispatcher. Messages with no dispatcher attached are dropped loudly.
async fn forward_inbound(ctx: &EventLoopContext, publish: Publish) {
    let topic = publish.topic.clone();
    let qos = QoS::from(publish.qos);
    let message_id = u32::from(publish.pkid);
    debug!(topic = %topic, message_id, qos = qos.as_u8(), "message arrived");

    if qos != QoS::AtMostOnce {
        ctx.pending_acks
            .lock()
            .await
            .insert(publish.pkid, publish.clone());
    }

    let sender = ctx
        .dispatcher
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let delivered = match sender {
        Some(tx) => tx
            .send(InboundMessage {
                topic: topic.clone(),
                payload: publish.payload.to_vec(),
                message_id,
                qos,
            })
            .await
            .is_ok(),
        None => false,
    };

    if !delivered {
        warn!(topic = %topic, "no dispatcher attached, dropping message");
        ctx.pending_acks.lock().await.remove(&publish.pkid);
    }
}

/// Sleep that ends early when shutdown is signalled. Returns false on
/// shutdown.
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}
