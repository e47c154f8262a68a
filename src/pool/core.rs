//! The connection pool.
//!
//! [`WebSocketPool`] owns every pooled connection, the load balancer, the
//! subscription registry and the monitor tasks. Handles are cheap to clone
//! and share one pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     WebSocketPool                        │
//! │                                                          │
//! │  send() ──► LoadBalancer ──► PooledConnection ──► write  │
//! │                                   │ (not connected)      │
//! │                                   ▼                      │
//! │                             MessageQueue ◄── health sweep│
//! │                                                          │
//! │  event pump (per connection) ──► SubscriptionRegistry    │
//! │           │ close / error                                │
//! │           ▼                                              │
//! │  failover ──► backoff ──► replacement connection         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Locking
//!
//! Pool state sits behind one `parking_lot::Mutex`. It is never held across
//! an `.await` and never while a subscriber callback runs.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, MessageId, Sequence, SubscriptionId};
use crate::lifecycle::{CleanupPriority, CleanupRegistry, CleanupResource, Deregistration};
use crate::protocol::{InboundMessage, Message, OutboundMessage};
use crate::transport::{CLOSE_HEALTH_DEPLETED, CLOSE_NORMAL, Connector, EventStream, TransportEvent};

use super::balancer::LoadBalancer;
use super::config::PoolConfig;
use super::connection::{ConnectionState, ERROR_PENALTY, INACTIVITY_PENALTY, PooledConnection};
use super::monitor::Monitor;
use super::queue::MessageQueue;
use super::stats::{PoolHealth, PoolStatistics};
use super::subscription::{Pattern, SubscriberFn, SubscriptionHandle, SubscriptionRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Queued messages written per connection per health sweep.
pub(crate) const DRAIN_BATCH: usize = 10;

/// Identifier the pool registers its teardown under.
const CLEANUP_ID: &str = "websocket-pool";

// ============================================================================
// Types
// ============================================================================

/// What a connection attempt creates.
enum Slot {
    /// A new connection counted against `max_connections`.
    Fresh(Url),
    /// A replacement for a disconnected or failed connection.
    Replace(ConnectionId),
}

/// Mutable pool state.
struct PoolState {
    connections: Vec<PooledConnection>,
    balancer: LoadBalancer,
    /// Messages written since build, retired connections included.
    sent_total: u64,
    /// Frames received since build, retired connections included.
    received_total: u64,
    /// Bumped on teardown; attempts started under an older value abort.
    generation: u64,
}

impl PoolState {
    #[inline]
    fn position(&self, id: ConnectionId) -> Option<usize> {
        self.connections.iter().position(|c| c.id == id)
    }

    fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id).collect()
    }
}

// ============================================================================
// WebSocketPool
// ============================================================================

/// Resilient multi-connection WebSocket pool.
///
/// Build one with [`PoolBuilder`](crate::PoolBuilder).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use ws_connection_pool::{Message, PoolBuilder};
///
/// # async fn example() -> ws_connection_pool::Result<()> {
/// let pool = PoolBuilder::new()
///     .url("ws://kitchen.local:9000/orders")
///     .build()?;
///
/// if pool.connect().await {
///     let _sub = pool.subscribe("order.ready", Arc::new(|msg, _conn| {
///         println!("ready: {}", msg.data);
///     }));
///     pool.send(Message::new("order.created", json!({ "table": "T4" })));
/// }
///
/// pool.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebSocketPool {
    inner: Arc<PoolInner>,
}

/// Shared pool internals.
pub(crate) struct PoolInner {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    subscriptions: SubscriptionRegistry,
    message_ids: Sequence,
    monitor: Mutex<Option<Monitor>>,
    /// Pending reconnection timers keyed by the connection they replace.
    reconnects: Mutex<FxHashMap<ConnectionId, JoinHandle<()>>>,
    registration: Mutex<Option<Deregistration>>,
}

// ============================================================================
// WebSocketPool - Constructor
// ============================================================================

impl WebSocketPool {
    /// Creates an unconnected pool.
    ///
    /// Spawns nothing. When a registry is given, the pool registers its
    /// teardown at [`CleanupPriority::High`]; the registration holds only a
    /// weak reference and is removed when the last handle is dropped.
    pub(crate) fn new(
        config: PoolConfig,
        connector: Arc<dyn Connector>,
        cleanup_registry: Option<Arc<dyn CleanupRegistry>>,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                connections: Vec::with_capacity(config.max_connections),
                balancer: LoadBalancer::new(config.load_balancing_strategy),
                sent_total: 0,
                received_total: 0,
                generation: 0,
            }),
            config,
            connector,
            subscriptions: SubscriptionRegistry::new(),
            message_ids: Sequence::default(),
            monitor: Mutex::new(None),
            reconnects: Mutex::new(FxHashMap::default()),
            registration: Mutex::new(None),
        });

        if let Some(registry) = cleanup_registry {
            let weak = Arc::downgrade(&inner);
            let registration = registry.register(CleanupResource::new(
                CLEANUP_ID,
                CleanupPriority::High,
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.teardown();
                    }
                },
            ));
            *inner.registration.lock() = Some(registration);
        }

        debug!(
            urls = inner.config.urls.len(),
            strategy = %inner.config.load_balancing_strategy,
            "WebSocketPool created"
        );

        Self { inner }
    }
}

// ============================================================================
// WebSocketPool - Public API
// ============================================================================

impl WebSocketPool {
    /// Returns the validated configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Opens up to `max_connections` of the configured endpoints.
    ///
    /// All attempts run concurrently and are awaited together; one failure
    /// never blocks the others. Failed attempts are not kept. The monitor
    /// starts with the first established connection. Endpoints that already
    /// have a tracked connection are skipped, so calling this again only
    /// fills in endpoints that were lost.
    ///
    /// Returns `true` if at least one connection is active afterwards.
    pub async fn connect(&self) -> bool {
        let config = &self.inner.config;
        if config.urls.is_empty() {
            warn!("No endpoints configured");
            return false;
        }

        let urls: Vec<Url> = {
            let state = self.inner.state.lock();
            let room = config.max_connections.saturating_sub(state.connections.len());
            config
                .urls
                .iter()
                .take(config.max_connections)
                .filter(|url| !state.connections.iter().any(|c| &c.url == *url))
                .take(room)
                .cloned()
                .collect()
        };

        if urls.is_empty() {
            debug!("Every endpoint already tracked");
            return self.inner.active_count() > 0;
        }

        info!(endpoints = urls.len(), "Connecting pool");

        let attempts = urls
            .into_iter()
            .map(|url| self.inner.create_connection(Slot::Fresh(url)));
        let results = join_all(attempts).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        let active = self.inner.active_count();

        info!(active, failed, "Pool connect settled");
        active > 0
    }

    /// Sends a message, returning `true` if it was written or queued.
    ///
    /// See [`try_send`](Self::try_send) for the reason on failure.
    pub fn send(&self, message: Message) -> bool {
        match self.try_send(message) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Send rejected");
                false
            }
        }
    }

    /// Sends a message through the load balancer.
    ///
    /// A connected target gets the message written immediately. A target
    /// that is still opening or awaiting reconnection queues it.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectionAvailable`] if the pool tracks no connection
    /// - [`Error::QueueFull`] if the target's queue is at capacity
    /// - the transport's error if the write fails
    pub fn try_send(&self, message: Message) -> Result<MessageId> {
        self.inner.try_send(message)
    }

    /// Registers a callback for inbound messages matching `pattern`.
    ///
    /// Accepts anything convertible into a [`Pattern`]: a `&str` for an
    /// exact type match or a compiled `regex::Regex`.
    pub fn subscribe(
        &self,
        pattern: impl Into<Pattern>,
        callback: SubscriberFn,
    ) -> SubscriptionHandle {
        self.inner.subscriptions.add(pattern.into(), None, callback)
    }

    /// Registers a callback with an advisory connection preference.
    ///
    /// The preference is reported in [`statistics`](Self::statistics) and
    /// does not restrict dispatch.
    pub fn subscribe_with_preference(
        &self,
        pattern: impl Into<Pattern>,
        connection_id: ConnectionId,
        callback: SubscriberFn,
    ) -> SubscriptionHandle {
        self.inner
            .subscriptions
            .add(pattern.into(), Some(connection_id), callback)
    }

    /// Removes a subscription by ID. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.inner.subscriptions.remove(id) {
            debug!(subscription_id = %id, "Subscription removed");
        }
    }

    /// Returns aggregate pool health.
    #[must_use]
    pub fn health_status(&self) -> Option<PoolHealth> {
        Some(self.inner.health())
    }

    /// Returns a detailed snapshot.
    #[must_use]
    pub fn statistics(&self) -> Option<PoolStatistics> {
        Some(self.inner.statistics())
    }

    /// Tears the pool down.
    ///
    /// Stops the monitor, cancels pending reconnections, closes every
    /// transport with code 1000 and clears connections and subscriptions.
    /// Idempotent; the pool may be connected again afterwards.
    pub fn disconnect(&self) {
        self.inner.teardown();
    }
}

impl fmt::Debug for WebSocketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("WebSocketPool")
            .field("connections", &state.connections.len())
            .field("strategy", &self.inner.config.load_balancing_strategy)
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PoolInner - Connection Lifecycle
// ============================================================================

impl PoolInner {
    /// Inserts a connecting connection and races its open against the
    /// connection timeout.
    async fn create_connection(self: &Arc<Self>, slot: Slot) -> Result<ConnectionId> {
        let replacing = matches!(slot, Slot::Replace(_));
        let (id, url, generation) = {
            let mut state = self.state.lock();
            let idx = match slot {
                Slot::Fresh(url) => {
                    if state.connections.len() >= self.config.max_connections {
                        warn!(%url, max = self.config.max_connections, "Pool at capacity");
                        return Err(Error::pool_exhausted(self.config.max_connections));
                    }
                    let connection = PooledConnection::new(
                        url,
                        0,
                        MessageQueue::new(self.config.message_queue_size),
                    );
                    state.connections.push(connection);
                    state.connections.len() - 1
                }
                Slot::Replace(old_id) => {
                    let Some(idx) = state.position(old_id) else {
                        return Err(Error::Aborted);
                    };
                    let old = &mut state.connections[idx];
                    old.close_transport(CLOSE_NORMAL, "replaced");
                    old.abort_pump();

                    let replacement = PooledConnection::new(
                        old.url.clone(),
                        old.reconnect_attempts + 1,
                        old.queue.take(),
                    );
                    debug!(
                        old_id = %old_id,
                        new_id = %replacement.id,
                        queued = replacement.queue.len(),
                        "Replacing connection"
                    );
                    state.connections[idx] = replacement;
                    idx
                }
            };

            let connection = &state.connections[idx];
            (connection.id, connection.url.clone(), state.generation)
        };

        debug!(connection_id = %id, %url, "Opening connection");

        let deadline = self.config.connection_timeout;
        let opened = match timeout(deadline, self.connector.open(&url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::connection_timeout(deadline.as_millis() as u64)),
        };

        let mut state = self.state.lock();

        let idx = match state.position(id) {
            Some(idx) if state.generation == generation => idx,
            _ => {
                if let Ok(opened) = opened
                    && let Err(e) = opened.transport.close(CLOSE_NORMAL, "pool disconnected")
                {
                    debug!(connection_id = %id, error = %e, "Close of stale transport failed");
                }
                debug!(connection_id = %id, "Connection attempt outlived teardown");
                return Err(Error::Aborted);
            }
        };

        match opened {
            Ok(opened) => {
                let pump = tokio::spawn(pump_events(Arc::downgrade(self), id, opened.events));
                let connection = &mut state.connections[idx];
                connection.mark_connected(opened.transport);
                connection.attach_pump(pump);
                info!(
                    connection_id = %id,
                    %url,
                    attempt = connection.reconnect_attempts,
                    "Connection established"
                );
                drop(state);

                self.ensure_monitor();
                Ok(id)
            }
            Err(e) => {
                state.connections[idx].mark_failed(e.to_string());
                warn!(connection_id = %id, %url, error = %e, "Connection attempt failed");

                if replacing {
                    self.schedule_failover(&mut state, idx);
                } else {
                    state.connections.remove(idx);
                }
                Err(e)
            }
        }
    }

    /// Reconnects after backoff, or removes the connection once the budget
    /// is spent or failover is off.
    fn schedule_failover(self: &Arc<Self>, state: &mut PoolState, idx: usize) {
        let connection = &state.connections[idx];
        let id = connection.id;
        let attempts = connection.reconnect_attempts;

        if self.config.enable_failover && attempts < self.config.max_reconnect_attempts {
            let delay = backoff_delay(
                self.config.reconnect_delay,
                attempts,
                self.config.max_reconnect_delay,
            );
            info!(
                connection_id = %id,
                url = %connection.url,
                attempt = attempts + 1,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnection"
            );

            let pool = Arc::downgrade(self);
            let handle = tokio::spawn(async move {
                sleep(delay).await;
                let Some(pool) = pool.upgrade() else {
                    return;
                };
                pool.reconnects.lock().remove(&id);
                if let Err(e) = pool.create_connection(Slot::Replace(id)).await {
                    debug!(connection_id = %id, error = %e, "Reconnection attempt ended");
                }
            });
            self.reconnects.lock().insert(id, handle);
            return;
        }

        let mut connection = state.connections.remove(idx);
        connection.close_transport(CLOSE_NORMAL, "removed");
        connection.abort_pump();

        let dropped = connection.queue.len();
        if dropped > 0 {
            warn!(connection_id = %id, dropped, "Dropping queued messages of removed connection");
        }
        warn!(
            connection_id = %id,
            url = %connection.url,
            attempts,
            failover = self.config.enable_failover,
            "Connection removed from pool"
        );
    }

    /// Fails a connection whose health reached zero and enters failover.
    fn deplete(self: &Arc<Self>, state: &mut PoolState, idx: usize) {
        let connection = &mut state.connections[idx];
        warn!(connection_id = %connection.id, "Connection health depleted");

        connection.close_transport(CLOSE_HEALTH_DEPLETED, "health depleted");
        connection.abort_pump();
        connection.mark_failed("health depleted");

        self.schedule_failover(state, idx);
    }

    /// Starts the monitor if it is not running.
    fn ensure_monitor(self: &Arc<Self>) {
        let mut monitor = self.monitor.lock();
        if monitor.is_none() {
            *monitor = Some(Monitor::start(
                Arc::downgrade(self),
                self.config.heartbeat_interval,
                self.config.health_check_interval,
            ));
        }
    }

    /// Stops everything and forgets all connections and subscriptions.
    fn teardown(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.stop();
        }

        let timers: Vec<JoinHandle<()>> = self.reconnects.lock().drain().map(|(_, h)| h).collect();
        for timer in &timers {
            timer.abort();
        }

        let connections = {
            let mut state = self.state.lock();
            state.generation += 1;
            std::mem::take(&mut state.connections)
        };

        let closed = connections.len();
        for mut connection in connections {
            connection.close_transport(CLOSE_NORMAL, "pool disconnected");
            connection.abort_pump();
        }

        self.subscriptions.clear();

        info!(
            connections = closed,
            cancelled_reconnects = timers.len(),
            "Pool disconnected"
        );
    }

    fn active_count(&self) -> usize {
        self.state
            .lock()
            .connections
            .iter()
            .filter(|c| c.is_connected())
            .count()
    }
}

// ============================================================================
// PoolInner - Delivery
// ============================================================================

impl PoolInner {
    fn try_send(self: &Arc<Self>, message: Message) -> Result<MessageId> {
        let id = MessageId::new(self.message_ids.next());
        let outbound = OutboundMessage::stamp(id, message, self.config.default_max_retries);

        let mut state = self.state.lock();
        let state = &mut *state;

        let Some(idx) = state.balancer.select(&state.connections) else {
            warn!(message_id = %id, message_type = %outbound.message_type, "No connection available");
            return Err(Error::NoConnectionAvailable);
        };

        self.deliver(state, idx, outbound)
    }

    /// Writes to a connected connection or queues on any other.
    fn deliver(
        self: &Arc<Self>,
        state: &mut PoolState,
        idx: usize,
        message: OutboundMessage,
    ) -> Result<MessageId> {
        let id = message.id;
        let connection = &mut state.connections[idx];

        if !connection.is_connected() {
            let connection_id = connection.id;
            let capacity = connection.queue.capacity();
            return match connection.queue.push(message) {
                Ok(()) => {
                    trace!(
                        %connection_id,
                        message_id = %id,
                        queued = connection.queue.len(),
                        "Message queued"
                    );
                    Ok(id)
                }
                Err(dropped) => {
                    warn!(
                        %connection_id,
                        message_id = %dropped.id,
                        capacity,
                        "Queue full, message dropped"
                    );
                    Err(Error::queue_full(connection_id, capacity))
                }
            };
        }

        match connection.write(&message) {
            Ok(()) => {
                state.sent_total += 1;
                Ok(id)
            }
            Err(e) => {
                if connection.health.is_depleted() {
                    self.deplete(state, idx);
                }
                Err(e)
            }
        }
    }

    /// Writes up to [`DRAIN_BATCH`] queued messages in FIFO order.
    ///
    /// A failed write puts the message back at the head, or discards it
    /// once its retry budget is spent, and ends this connection's turn.
    fn drain_queue(self: &Arc<Self>, state: &mut PoolState, idx: usize) {
        let connection = &mut state.connections[idx];
        let mut written = 0;
        let mut depleted = false;

        for _ in 0..DRAIN_BATCH {
            let Some(mut message) = connection.queue.pop() else {
                break;
            };

            if connection.write(&message).is_ok() {
                written += 1;
                continue;
            }

            if message.record_failure() {
                connection.queue.requeue(message);
            } else {
                warn!(
                    connection_id = %connection.id,
                    message_id = %message.id,
                    retries = message.retry_count - 1,
                    "Discarding message after exhausting retries"
                );
            }
            depleted = connection.health.is_depleted();
            break;
        }

        if written > 0 {
            debug!(
                connection_id = %connection.id,
                written,
                remaining = connection.queue.len(),
                "Drained queued messages"
            );
        }

        state.sent_total += written;
        if depleted {
            self.deplete(state, idx);
        }
    }
}

// ============================================================================
// PoolInner - Monitor Callbacks
// ============================================================================

impl PoolInner {
    /// Sends one heartbeat to every connected connection.
    pub(crate) fn broadcast_heartbeat(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let mut sent = 0usize;

        for id in state.ids() {
            let Some(idx) = state.position(id) else {
                continue;
            };
            if !state.connections[idx].is_connected() {
                continue;
            }

            let heartbeat = OutboundMessage::heartbeat(MessageId::new(self.message_ids.next()));
            match self.deliver(&mut state, idx, heartbeat) {
                Ok(_) => sent += 1,
                Err(e) => debug!(connection_id = %id, error = %e, "Heartbeat failed"),
            }
        }

        trace!(sent, "Heartbeat broadcast");
    }

    /// Penalizes idle connections, then drains queues.
    pub(crate) fn health_sweep(self: &Arc<Self>) {
        let now = Instant::now();
        let threshold = self.config.inactivity_threshold();
        let mut state = self.state.lock();

        for id in state.ids() {
            let Some(idx) = state.position(id) else {
                continue;
            };
            let connection = &mut state.connections[idx];
            if !connection.is_connected() || !connection.is_idle(now, threshold) {
                continue;
            }

            let depleted = connection.penalize(INACTIVITY_PENALTY);
            debug!(
                connection_id = %id,
                health = connection.health.value(),
                "Inactive connection penalized"
            );
            if depleted {
                self.deplete(&mut state, idx);
            }
        }

        for id in state.ids() {
            if let Some(idx) = state.position(id)
                && state.connections[idx].is_connected()
                && !state.connections[idx].queue.is_empty()
            {
                self.drain_queue(&mut state, idx);
            }
        }
    }
}

// ============================================================================
// PoolInner - Transport Events
// ============================================================================

impl PoolInner {
    fn handle_message(&self, id: ConnectionId, text: &str) {
        let parsed = InboundMessage::parse(text);

        {
            let mut state = self.state.lock();
            let Some(idx) = state.position(id) else {
                return;
            };
            let connection = &mut state.connections[idx];
            connection.record_received();
            // Only a well-formed frame proves the link; garbage keeps the budget.
            if parsed.is_ok() {
                connection.reconnect_attempts = 0;
            }
            state.received_total += 1;
        }

        match parsed {
            Ok(message) => {
                self.subscriptions.dispatch(&message, &id);
            }
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Dropping malformed inbound frame");
            }
        }
    }

    fn handle_transport_error(self: &Arc<Self>, id: ConnectionId, reason: String) {
        let mut state = self.state.lock();
        let Some(idx) = state.position(id) else {
            return;
        };

        let connection = &mut state.connections[idx];
        error!(connection_id = %id, error = %reason, "Transport error");

        let connected = connection.is_connected();
        connection.last_error = Some(reason);
        if connected && connection.penalize(ERROR_PENALTY) {
            self.deplete(&mut state, idx);
        }
    }

    fn handle_close(self: &Arc<Self>, id: ConnectionId, code: Option<u16>, reason: &str) {
        let mut state = self.state.lock();
        let Some(idx) = state.position(id) else {
            return;
        };

        let connection = &mut state.connections[idx];
        if !connection.is_connected() {
            return;
        }

        info!(connection_id = %id, code, reason, "Connection closed by remote");
        connection.mark_disconnected(reason);
        self.schedule_failover(&mut state, idx);
    }
}

// ============================================================================
// PoolInner - Snapshots
// ============================================================================

impl PoolInner {
    fn health(&self) -> PoolHealth {
        let state = self.state.lock();
        let connections = &state.connections;

        let count = |target: ConnectionState| connections.iter().filter(|c| c.state == target).count();
        let average_health = if connections.is_empty() {
            0.0
        } else {
            connections.iter().map(|c| c.health.value()).sum::<f64>() / connections.len() as f64
        };

        PoolHealth {
            total_connections: connections.len(),
            active_connections: count(ConnectionState::Connected),
            failed_connections: count(ConnectionState::Failed),
            average_health,
            queued_messages: connections.iter().map(|c| c.queue.len()).sum(),
            messages_sent: state.sent_total,
            messages_received: state.received_total,
        }
    }

    fn statistics(&self) -> PoolStatistics {
        let health = self.health();
        let preferences = self.subscriptions.preference_counts();
        let now = Instant::now();

        let state = self.state.lock();
        let connections = state
            .connections
            .iter()
            .map(|c| {
                let preferred_by = preferences.get(&c.id).copied().unwrap_or(0);
                (c.id, c.stats(now, preferred_by))
            })
            .collect();

        PoolStatistics {
            health,
            connections,
            load_balancer: state.balancer.stats(),
            subscriptions: self.subscriptions.len(),
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.stop();
        }
        for (_, timer) in self.reconnects.get_mut().drain() {
            timer.abort();
        }
        if let Some(registration) = self.registration.get_mut().take() {
            registration.unregister();
        }
    }
}

// ============================================================================
// Event Pump
// ============================================================================

/// Feeds one connection's transport events into the pool.
///
/// Holds only a weak reference; exits when the pool is gone or the
/// transport reports close.
async fn pump_events(pool: Weak<PoolInner>, id: ConnectionId, mut events: EventStream) {
    while let Some(event) = events.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };

        match event {
            TransportEvent::Message(text) => pool.handle_message(id, &text),
            TransportEvent::Error(reason) => pool.handle_transport_error(id, reason),
            TransportEvent::Closed { code, reason } => {
                pool.handle_close(id, code, &reason);
                break;
            }
        }
    }

    trace!(connection_id = %id, "Event pump exited");
}

// ============================================================================
// Backoff
// ============================================================================

/// Delay before reconnect attempt `attempts + 1`: `base × 2^attempts`,
/// limited by `max` when one is set. Saturates instead of overflowing.
pub(crate) fn backoff_delay(base: Duration, attempts: u32, max: Option<Duration>) -> Duration {
    let ceiling = max.unwrap_or(Duration::MAX);
    2u32
        .checked_pow(attempts)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(ceiling, |delay| delay.min(ceiling))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::Value;

    use crate::pool::connection::testing::{RecordingTransport, connected};
    use crate::transport::OpenedTransport;

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn open(&self, url: &Url) -> Result<OpenedTransport> {
            Err(Error::connection(format!("{url} unreachable")))
        }
    }

    /// Pool holding one connected connection, no tasks running.
    fn pool_with_connection() -> (WebSocketPool, RecordingTransport) {
        let config = PoolConfig {
            heartbeat_interval: Duration::from_secs(1),
            ..PoolConfig::default()
        };
        let pool = WebSocketPool::new(config, Arc::new(Unreachable), None);
        let (connection, transport) = connected("ws://a.local");
        pool.inner.state.lock().connections.push(connection);
        (pool, transport)
    }

    fn queue_messages(pool: &WebSocketPool, count: u64, max_retries: u32) {
        let mut state = pool.inner.state.lock();
        let connection = &mut state.connections[0];
        for n in 0..count {
            let message = Message::new("queued", Value::from(n)).with_max_retries(max_retries);
            let outbound = OutboundMessage::stamp(MessageId::new(n + 1), message, 3);
            connection.queue.push(outbound).unwrap();
        }
    }

    fn queued(pool: &WebSocketPool) -> usize {
        pool.inner.state.lock().connections[0].queue.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_penalizes_idle_connection() {
        let (pool, _transport) = pool_with_connection();

        pool.inner.health_sweep();
        assert_eq!(pool.health_status().unwrap().average_health, 1.0);

        tokio::time::advance(Duration::from_millis(2100)).await;
        pool.inner.health_sweep();

        let health = pool.health_status().unwrap().average_health;
        assert!((health - 0.9).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drains_one_batch() {
        let (pool, transport) = pool_with_connection();
        queue_messages(&pool, 25, 3);

        pool.inner.health_sweep();
        assert_eq!(transport.frames.lock().len(), DRAIN_BATCH);
        assert_eq!(queued(&pool), 15);
        assert_eq!(pool.health_status().unwrap().messages_sent, DRAIN_BATCH as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_drain_requeues_then_discards() {
        let (pool, transport) = pool_with_connection();
        queue_messages(&pool, 1, 1);
        transport.refuse.store(true, Ordering::SeqCst);

        pool.inner.health_sweep();
        assert_eq!(queued(&pool), 1, "failed head goes back to the front");

        pool.inner.health_sweep();
        assert_eq!(queued(&pool), 0, "discarded once retries exceed the budget");

        assert!(transport.frames.lock().is_empty());
        let health = pool.health_status().unwrap().average_health;
        assert!((health - 0.8).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_skips_queue() {
        let (pool, transport) = pool_with_connection();
        queue_messages(&pool, 3, 3);

        pool.inner.broadcast_heartbeat();

        let frames = transport.frames.lock();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""type":"heartbeat""#));
        drop(frames);
        assert_eq!(queued(&pool), 3);
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_backoff_doubles() {
        let max = Some(Duration::from_secs(30));
        assert_eq!(backoff_delay(ms(100), 0, max), ms(100));
        assert_eq!(backoff_delay(ms(100), 1, max), ms(200));
        assert_eq!(backoff_delay(ms(100), 2, max), ms(400));
        assert_eq!(backoff_delay(ms(100), 3, max), ms(800));
    }

    #[test]
    fn test_backoff_uncapped_by_default() {
        let max = PoolConfig::default().max_reconnect_delay;
        let base = Duration::from_secs(10);
        let delays: Vec<Duration> = (0..4).map(|k| backoff_delay(base, k, max)).collect();
        assert_eq!(
            delays,
            [10, 20, 40, 80].map(Duration::from_secs).to_vec()
        );
        assert_eq!(backoff_delay(base, u32::MAX, max), Duration::MAX);
    }

    #[test]
    fn test_backoff_is_capped() {
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(Duration::from_secs(1), 5, Some(max)), max);
        assert_eq!(backoff_delay(Duration::from_secs(1), 40, Some(max)), max);
        assert_eq!(backoff_delay(Duration::from_secs(1), u32::MAX, Some(max)), max);
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_bounded(
            base_ms in 1u64..10_000,
            attempts in 0u32..64,
            max_ms in 10_000u64..600_000,
        ) {
            let base = ms(base_ms);
            let max = ms(max_ms);
            let current = backoff_delay(base, attempts, Some(max));
            let next = backoff_delay(base, attempts + 1, Some(max));

            prop_assert!(current <= max);
            prop_assert!(current >= base.min(max));
            prop_assert!(next >= current);
        }
    }
}
