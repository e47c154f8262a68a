//! Pooled connection state.
//!
//! A [`PooledConnection`] is one managed transport endpoint. It is owned
//! by the pool and never handed out; callers see
//! [`ConnectionStats`](super::ConnectionStats) snapshots instead.
//!
//! # State Machine
//!
//! ```text
//!                open                    remote close
//! Connecting ─────────► Connected ───────────────────► Disconnected
//!     │                     │                              │
//!     │ timeout / error     │ health depleted              │ backoff elapsed
//!     ▼                     ▼                              ▼
//!   Failed               Failed                   new Connecting (new id)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::OutboundMessage;
use crate::transport::Transport;

use super::queue::MessageQueue;
use super::stats::ConnectionStats;

// ============================================================================
// Constants
// ============================================================================

/// Health lost on a transport error or failed write.
pub(crate) const ERROR_PENALTY: f64 = 0.1;

/// Health lost per sweep while a connection stays silent.
pub(crate) const INACTIVITY_PENALTY: f64 = 0.1;

/// Values below this count as zero health.
const HEALTH_EPSILON: f64 = 1e-9;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Open in progress.
    Connecting,
    /// Open and usable.
    Connected,
    /// Closed by the remote end; may be awaiting reconnection.
    Disconnected,
    /// Open failed or health ran out.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health score clamped to `[0, 1]`.
///
/// Only penalties lower it; the only way back to `1.0` is a fresh open.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct Health(f64);

impl Health {
    pub(crate) const FULL: Self = Self(1.0);

    #[inline]
    pub(crate) fn value(self) -> f64 {
        self.0
    }

    /// Subtracts `amount`. Returns `true` if health is now zero.
    pub(crate) fn penalize(&mut self, amount: f64) -> bool {
        let next = (self.0 - amount.max(0.0)).clamp(0.0, 1.0);
        self.0 = if next < HEALTH_EPSILON { 0.0 } else { next };
        self.is_depleted()
    }

    #[inline]
    pub(crate) fn is_depleted(self) -> bool {
        self.0 <= 0.0
    }
}

// ============================================================================
// PooledConnection
// ============================================================================

/// One managed transport endpoint.
pub(crate) struct PooledConnection {
    pub(crate) id: ConnectionId,
    pub(crate) url: Url,
    pub(crate) state: ConnectionState,
    pub(crate) health: Health,
    pub(crate) last_activity: Instant,
    pub(crate) messages_sent: u64,
    pub(crate) messages_received: u64,
    pub(crate) reconnect_attempts: u32,
    pub(crate) queue: MessageQueue,
    pub(crate) last_error: Option<String>,
    transport: Option<Box<dyn Transport>>,
    pump: Option<JoinHandle<()>>,
}

impl PooledConnection {
    /// Creates a connection in the `Connecting` state.
    pub(crate) fn new(url: Url, reconnect_attempts: u32, queue: MessageQueue) -> Self {
        Self {
            id: ConnectionId::generate(),
            url,
            state: ConnectionState::Connecting,
            health: Health::FULL,
            last_activity: Instant::now(),
            messages_sent: 0,
            messages_received: 0,
            reconnect_attempts,
            queue,
            last_error: None,
            transport: None,
            pump: None,
        }
    }

    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Transitions to `Connected` with a freshly opened transport.
    pub(crate) fn mark_connected(&mut self, transport: Box<dyn Transport>) {
        self.state = ConnectionState::Connected;
        self.health = Health::FULL;
        self.last_activity = Instant::now();
        self.last_error = None;
        self.transport = Some(transport);
    }

    /// Attaches the event pump. Called once per connection instance.
    pub(crate) fn attach_pump(&mut self, pump: JoinHandle<()>) {
        debug_assert!(self.pump.is_none(), "event pump attached twice");
        self.pump = Some(pump);
    }

    /// Transitions to `Failed`, releasing the transport.
    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = ConnectionState::Failed;
        self.last_error = Some(reason.into());
        self.transport = None;
    }

    /// Transitions to `Disconnected`, releasing the transport.
    pub(crate) fn mark_disconnected(&mut self, reason: impl Into<String>) {
        self.state = ConnectionState::Disconnected;
        let reason = reason.into();
        if !reason.is_empty() {
            self.last_error = Some(reason);
        }
        self.transport = None;
    }

    /// Writes a message to the transport.
    ///
    /// Success bumps `messages_sent` and `last_activity`. A transport
    /// failure costs [`ERROR_PENALTY`] health.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if no transport is attached
    /// - [`Error::Json`] if the message cannot be serialized
    /// - the transport's error if the write is refused
    pub(crate) fn write(&mut self, message: &OutboundMessage) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(Error::ConnectionClosed)?;
        let text = message.to_wire()?;

        match transport.send(text) {
            Ok(()) => {
                self.messages_sent += 1;
                self.last_activity = Instant::now();
                trace!(connection_id = %self.id, message_id = %message.id, "Message written");
                Ok(())
            }
            Err(e) => {
                self.health.penalize(ERROR_PENALTY);
                self.last_error = Some(e.to_string());
                warn!(
                    connection_id = %self.id,
                    error = %e,
                    health = self.health.value(),
                    "Transport write failed"
                );
                Err(e)
            }
        }
    }

    /// Records an inbound frame.
    pub(crate) fn record_received(&mut self) {
        self.messages_received += 1;
        self.last_activity = Instant::now();
    }

    /// Applies a health penalty. Returns `true` if health is now zero.
    #[inline]
    pub(crate) fn penalize(&mut self, amount: f64) -> bool {
        self.health.penalize(amount)
    }

    /// Returns `true` if nothing was sent or received for longer than `threshold`.
    #[inline]
    pub(crate) fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > threshold
    }

    /// Closes the transport, if any. Failures are logged.
    pub(crate) fn close_transport(&mut self, code: u16, reason: &str) {
        if let Some(transport) = self.transport.take()
            && let Err(e) = transport.close(code, reason)
        {
            debug!(connection_id = %self.id, error = %e, "Transport close failed");
        }
    }

    /// Stops the event pump, if any.
    pub(crate) fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    /// Builds a read-only snapshot.
    pub(crate) fn stats(&self, now: Instant, preferred_by: usize) -> ConnectionStats {
        ConnectionStats {
            id: self.id,
            url: self.url.to_string(),
            state: self.state,
            health: self.health.value(),
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            queued_messages: self.queue.len(),
            reconnect_attempts: self.reconnect_attempts,
            idle_ms: now.saturating_duration_since(self.last_activity).as_millis() as u64,
            last_error: self.last_error.clone(),
            preferred_by,
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("health", &self.health.value())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::connected;
    use super::*;

    use std::sync::atomic::Ordering;

    use proptest::prelude::*;
    use serde_json::Value;

    use crate::identifiers::MessageId;
    use crate::protocol::Message;

    fn message() -> OutboundMessage {
        OutboundMessage::stamp(MessageId::new(1), Message::new("t", Value::Null), 3)
    }

    #[test]
    fn test_new_connection_is_connecting_and_healthy() {
        let connection = PooledConnection::new(
            Url::parse("ws://a.local").unwrap(),
            2,
            MessageQueue::new(10),
        );
        assert_eq!(connection.state, ConnectionState::Connecting);
        assert_eq!(connection.health.value(), 1.0);
        assert_eq!(connection.reconnect_attempts, 2);
    }

    #[tokio::test]
    async fn test_write_counts_and_records() {
        let (mut connection, transport) = connected("ws://a.local");
        connection.write(&message()).expect("write");

        assert_eq!(connection.messages_sent, 1);
        assert_eq!(transport.frames.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_costs_health() {
        let (mut connection, transport) = connected("ws://a.local");
        transport.refuse.store(true, Ordering::SeqCst);

        assert!(connection.write(&message()).is_err());
        assert_eq!(connection.messages_sent, 0);
        assert!((connection.health.value() - 0.9).abs() < 1e-9);
        assert!(connection.last_error.is_some());
    }

    #[tokio::test]
    async fn test_write_without_transport() {
        let mut connection = PooledConnection::new(
            Url::parse("ws://a.local").unwrap(),
            0,
            MessageQueue::new(10),
        );
        assert!(matches!(
            connection.write(&message()),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_ten_penalties_deplete_health() {
        let mut health = Health::FULL;
        for _ in 0..9 {
            assert!(!health.penalize(ERROR_PENALTY));
        }
        assert!(health.penalize(ERROR_PENALTY));
        assert_eq!(health.value(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_detection() {
        let (connection, _) = connected("ws://a.local");
        let threshold = Duration::from_secs(60);

        assert!(!connection.is_idle(Instant::now(), threshold));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(connection.is_idle(Instant::now(), threshold));
    }

    #[tokio::test]
    async fn test_mark_failed_releases_transport() {
        let (mut connection, _) = connected("ws://a.local");
        connection.mark_failed("timeout");

        assert_eq!(connection.state, ConnectionState::Failed);
        assert_eq!(connection.last_error.as_deref(), Some("timeout"));
        assert!(connection.write(&message()).is_err());
    }

    proptest! {
        #[test]
        fn prop_health_stays_in_unit_interval(penalties in prop::collection::vec(-1.0f64..2.0, 0..64)) {
            let mut health = Health::FULL;
            for amount in penalties {
                health.penalize(amount);
                prop_assert!((0.0..=1.0).contains(&health.value()));
            }
        }
    }
}
