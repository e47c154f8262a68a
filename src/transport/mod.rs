//! Transport layer.
//!
//! The pool depends on transports only through the traits in `connector`:
//! open/close/error/message events, `send(text)` and `close(code, reason)`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   Connector::open    ┌─────────────────┐
//! │  WebSocketPool  │─────────────────────►│  Endpoint       │
//! │                 │                      │  (ws:// server) │
//! │  Transport      │──── text frames ────►│                 │
//! │  EventStream    │◄─── TransportEvent ──│                 │
//! └─────────────────┘                      └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | `Connector` / `Transport` traits and `TransportEvent` |
//! | `websocket` | `tokio-tungstenite` implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Transport traits and events.
pub mod connector;

/// WebSocket transport over `tokio-tungstenite`.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{
    CLOSE_HEALTH_DEPLETED, CLOSE_NORMAL, Connector, EventStream, OpenedTransport, Transport,
    TransportEvent,
};
pub use websocket::WebSocketConnector;
