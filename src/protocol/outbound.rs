//! Outbound message types.
//!
//! [`Message`] is what callers hand to the pool; [`OutboundMessage`] is the
//! stamped form that sits in a connection queue and goes over the wire.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::MessageId;

// ============================================================================
// Constants
// ============================================================================

/// Message type used for keepalive broadcasts.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

// ============================================================================
// Priority
// ============================================================================

/// Delivery priority hint.
///
/// Stored and sent on the wire only. Queues stay FIFO regardless of
/// priority and the load balancer ignores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background traffic such as heartbeats.
    Low,
    /// Regular application traffic.
    #[default]
    Normal,
    /// Time-sensitive traffic.
    High,
}

// ============================================================================
// Message
// ============================================================================

/// A message submitted by the application.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use ws_connection_pool::{Message, Priority};
///
/// let message = Message::new("order.created", json!({ "orderId": 42 }))
///     .with_priority(Priority::High)
///     .with_max_retries(5);
///
/// assert_eq!(message.message_type, "order.created");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Type discriminator, also used for subscription matching.
    pub message_type: String,
    /// Opaque payload.
    pub data: Value,
    /// Priority hint.
    pub priority: Priority,
    /// Redelivery budget; the pool default applies when `None`.
    pub max_retries: Option<u32>,
}

impl Message {
    /// Creates a normal-priority message.
    #[inline]
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            priority: Priority::Normal,
            max_retries: None,
        }
    }

    /// Sets the priority hint.
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the redelivery budget.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A stamped message owned by the pool until written to a transport.
///
/// # Format
///
/// ```json
/// {
///   "id": 17,
///   "type": "order.created",
///   "data": { ... },
///   "timestamp": 1760774400000,
///   "priority": "normal",
///   "retryCount": 0,
///   "maxRetries": 3
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Pool-unique identifier.
    pub id: MessageId,

    /// Type discriminator.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload.
    pub data: Value,

    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Priority hint.
    pub priority: Priority,

    /// Failed queued deliveries so far.
    pub retry_count: u32,

    /// Failed queued deliveries tolerated before the message is discarded.
    pub max_retries: u32,
}

impl OutboundMessage {
    /// Stamps a caller message with an ID and creation time.
    #[must_use]
    pub(crate) fn stamp(id: MessageId, message: Message, default_max_retries: u32) -> Self {
        Self {
            id,
            message_type: message.message_type,
            data: message.data,
            timestamp: now_millis(),
            priority: message.priority,
            retry_count: 0,
            max_retries: message.max_retries.unwrap_or(default_max_retries),
        }
    }

    /// Builds a low-priority heartbeat.
    #[must_use]
    pub(crate) fn heartbeat(id: MessageId) -> Self {
        let timestamp = now_millis();
        Self {
            id,
            message_type: HEARTBEAT_TYPE.to_string(),
            data: json!({ "timestamp": timestamp }),
            timestamp,
            priority: Priority::Low,
            retry_count: 0,
            max_retries: 0,
        }
    }

    /// Serializes the message into a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be
    /// serialized.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Records a failed delivery.
    ///
    /// Returns `false` once the retry budget is spent and the message
    /// should be discarded.
    #[inline]
    pub(crate) fn record_failure(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count <= self.max_retries
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Milliseconds since the Unix epoch, saturating to 0 on clock skew.
#[must_use]
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_defaults() {
        let message = Message::new("order.created", json!({}));
        assert_eq!(message.priority, Priority::Normal);
        assert_eq!(message.max_retries, None);
    }

    #[test]
    fn test_stamp_uses_pool_default_retries() {
        let message = Message::new("order.created", json!({ "id": 1 }));
        let stamped = OutboundMessage::stamp(MessageId::new(7), message, 3);

        assert_eq!(stamped.id, MessageId::new(7));
        assert_eq!(stamped.max_retries, 3);
        assert_eq!(stamped.retry_count, 0);
        assert!(stamped.timestamp > 0);
    }

    #[test]
    fn test_stamp_keeps_explicit_retries() {
        let message = Message::new("payment.captured", Value::Null).with_max_retries(9);
        let stamped = OutboundMessage::stamp(MessageId::new(1), message, 3);
        assert_eq!(stamped.max_retries, 9);
    }

    #[test]
    fn test_wire_format() {
        let message = Message::new("order.created", json!({ "orderId": 42 }))
            .with_priority(Priority::High);
        let stamped = OutboundMessage::stamp(MessageId::new(5), message, 3);

        let wire: Value = serde_json::from_str(&stamped.to_wire().unwrap()).unwrap();
        assert_eq!(wire["id"], 5);
        assert_eq!(wire["type"], "order.created");
        assert_eq!(wire["data"]["orderId"], 42);
        assert_eq!(wire["priority"], "high");
        assert_eq!(wire["retryCount"], 0);
        assert_eq!(wire["maxRetries"], 3);
        assert!(wire["timestamp"].as_u64().is_some());
    }

    #[test]
    fn test_heartbeat_is_low_priority() {
        let heartbeat = OutboundMessage::heartbeat(MessageId::new(1));
        assert_eq!(heartbeat.message_type, HEARTBEAT_TYPE);
        assert_eq!(heartbeat.priority, Priority::Low);
        assert_eq!(heartbeat.data["timestamp"], heartbeat.timestamp);
    }

    #[test]
    fn test_record_failure_exhausts_budget() {
        let message = Message::new("order.updated", Value::Null).with_max_retries(2);
        let mut stamped = OutboundMessage::stamp(MessageId::new(1), message, 3);

        assert!(stamped.record_failure());
        assert!(stamped.record_failure());
        assert!(!stamped.record_failure());
        assert_eq!(stamped.retry_count, 3);
    }
}
