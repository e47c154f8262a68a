//! WebSocket protocol message types.
//!
//! Messages are JSON objects sent as single text frames. No further framing
//! (length prefixes, compression) is applied; the transport's own message
//! boundaries delimit them.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Message`] | Caller → Pool | Submission from application code |
//! | [`OutboundMessage`] | Pool → Remote | Stamped, queued wire message |
//! | [`InboundMessage`] | Remote → Pool | Routed to subscribers |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Parsing of received frames |
//! | `outbound` | Submission and wire types |

// ============================================================================
// Submodules
// ============================================================================

/// Received message type.
pub mod inbound;

/// Submitted and stamped message types.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::InboundMessage;
pub use outbound::{HEARTBEAT_TYPE, Message, OutboundMessage, Priority};
