//! Transport abstraction.
//!
//! The pool never touches sockets directly. A [`Connector`] opens a link to
//! an endpoint and hands back a [`Transport`] for writes plus a stream of
//! [`TransportEvent`]s for everything the remote end does.
//!
//! Opening resolves once the link is usable (the "open" event). Failing to
//! open is reported as an error from [`Connector::open`]; the pool races it
//! against its connection timeout.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the pool retires a connection whose health is spent.
pub const CLOSE_HEALTH_DEPLETED: u16 = 4000;

// ============================================================================
// TransportEvent
// ============================================================================

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// A transport-level error occurred. The link may still be open.
    Error(String),
    /// The link closed. No further events follow.
    Closed {
        /// Close code, if the remote end sent one.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Receiving half of a transport's event stream.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// Transport
// ============================================================================

/// Write side of an open link.
///
/// Both methods are non-blocking: implementations hand frames to their own
/// I/O task.
pub trait Transport: Send + Sync {
    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if
    /// the link can no longer accept writes.
    fn send(&self, text: String) -> Result<()>;

    /// Starts a graceful close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if
    /// the link is already gone.
    fn close(&self, code: u16, reason: &str) -> Result<()>;
}

// ============================================================================
// OpenedTransport
// ============================================================================

/// Result of a successful open.
pub struct OpenedTransport {
    /// Write side.
    pub transport: Box<dyn Transport>,
    /// Event stream.
    pub events: EventStream,
}

impl OpenedTransport {
    /// Bundles a transport with its event stream.
    #[inline]
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, events: EventStream) -> Self {
        Self { transport, events }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens transports to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a link to `url`, resolving once it is ready for traffic.
    ///
    /// # Errors
    ///
    /// Returns a connection or WebSocket error if the endpoint cannot be
    /// reached or the handshake fails.
    async fn open(&self, url: &Url) -> Result<OpenedTransport>;
}
