//! Error types for the WebSocket pool.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_connection_pool::{Message, Result, WebSocketPool};
//!
//! fn publish(pool: &WebSocketPool) -> Result<()> {
//!     pool.try_send(Message::new("order.created", serde_json::json!({ "id": 7 })))?;
//!     Ok(())
//! }
//! ```
//!
//! None of these errors escape the pool as panics. Background failures
//! (reconnects, heartbeats, queue draining) are logged and absorbed; the
//! boolean surface (`connect()`, `send()`) collapses them to `false`.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`], [`Error::Pattern`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Aborted`] |
//! | Capacity | [`Error::PoolExhausted`], [`Error::NoConnectionAvailable`], [`Error::QueueFull`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by [`PoolBuilder::build`](crate::PoolBuilder::build) when a
    /// setting is out of range.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Subscription pattern is not a valid regular expression.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not open in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport is closed and cannot accept writes.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection attempt outlived the pool generation that started it.
    ///
    /// Returned when `disconnect()` runs while an open is still in flight.
    #[error("Connection attempt aborted by pool teardown")]
    Aborted,

    // ========================================================================
    // Capacity Errors
    // ========================================================================
    /// The pool already tracks its maximum number of connections.
    #[error("Connection pool exhausted: {max} connections")]
    PoolExhausted {
        /// Configured connection cap.
        max: usize,
    },

    /// No tracked connection can take the message.
    #[error("No connection available")]
    NoConnectionAvailable,

    /// The selected connection's outbound queue is at capacity.
    #[error("Queue full on {connection_id} (capacity {capacity})")]
    QueueFull {
        /// Connection whose queue rejected the message.
        connection_id: ConnectionId,
        /// Configured queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame did not follow the wire format.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a pool exhausted error.
    #[inline]
    pub fn pool_exhausted(max: usize) -> Self {
        Self::PoolExhausted { max }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(connection_id: ConnectionId, capacity: usize) -> Self {
        Self::QueueFull {
            connection_id,
            capacity,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Aborted
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the caller retries later, once
    /// the pool has reconnected or drained its queues.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NoConnectionAvailable
                | Self::QueueFull { .. }
                | Self::PoolExhausted { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
