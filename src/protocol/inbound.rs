//! Inbound message type.
//!
//! Every text frame received from an endpoint is parsed into an
//! [`InboundMessage`] before subscription matching. Frames that are not
//! JSON objects with a string `type` are rejected.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// InboundMessage
// ============================================================================

/// A message received from a remote endpoint.
///
/// # Format
///
/// ```json
/// {
///   "type": "order.created",
///   "data": { ... },
///   "id": 17,
///   "timestamp": 1760774400000
/// }
/// ```
///
/// Only `type` is required. Unknown top-level fields are kept in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Type discriminator.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Payload, `null` when absent.
    #[serde(default)]
    pub data: Value,

    /// Sender-assigned ID, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Sender timestamp, if any. Kept as sent: epoch millis, float seconds
    /// and ISO strings are all accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    /// Remaining top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not a JSON object with a
    /// string `type` field.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("Malformed inbound message: {e}")))
    }

    /// Returns the payload serialized as JSON text.
    ///
    /// Used by regex subscriptions, which match against the payload as well
    /// as the type.
    #[must_use]
    pub fn data_json(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_default()
    }

    /// Returns the sender timestamp as epoch milliseconds, if it was sent
    /// as an integer.
    #[inline]
    #[must_use]
    pub fn timestamp_millis(&self) -> Option<u64> {
        self.timestamp.as_ref().and_then(Value::as_u64)
    }

    /// Gets a string value from the payload.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 value from the payload.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.data
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
