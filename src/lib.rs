//! WebSocket Connection Pool - Resilient multi-connection messaging client.
//!
//! This library keeps several WebSocket connections open to one or more
//! endpoints, spreads outbound messages across them, recovers from
//! failures and routes inbound messages to pattern-based subscribers.
//!
//! # Architecture
//!
//! The pool follows an owner-and-snapshot model:
//!
//! - **Pool (Rust)**: Owns every connection, queue and timer
//! - **Callers**: Send messages, subscribe, read [`PoolHealth`] snapshots
//!
//! Key design principles:
//!
//! - Each pooled connection owns: transport + event pump + bounded queue
//! - Wire format is one JSON text frame per message (`id`, `type`, `data`, ...)
//! - Connections are never handed out; callers see read-only statistics
//! - Failures are absorbed (backoff, failover, health decay), never escalated
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use ws_connection_pool::{LoadBalancingStrategy, Message, PoolBuilder, Priority, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Build a pool over two kitchen display endpoints
//!     let pool = PoolBuilder::new()
//!         .url("ws://kitchen-a.local:9000/orders")
//!         .url("ws://kitchen-b.local:9000/orders")
//!         .max_connections(2)
//!         .load_balancing_strategy(LoadBalancingStrategy::RoundRobin)
//!         .build()?;
//!
//!     if !pool.connect().await {
//!         eprintln!("no endpoint reachable");
//!     }
//!
//!     // React to status updates
//!     let subscription = pool.subscribe("order.ready", Arc::new(|msg, conn| {
//!         println!("{conn}: order ready {}", msg.data);
//!     }));
//!
//!     // Publish an order; queued if no connection is up yet
//!     let message = Message::new("order.created", json!({ "table": "T4" }))
//!         .with_priority(Priority::High);
//!     pool.send(message);
//!
//!     subscription.unsubscribe();
//!     pool.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pool`] | [`WebSocketPool`], builder, balancing, subscriptions |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`lifecycle`] | Cleanup registry and shutdown ordering |
//! | [`protocol`] | Outbound and inbound message types |
//! | [`transport`] | Transport traits and the WebSocket connector |
//!
//! # Features
//!
//! - **Load balancing**: round-robin, least-queued or health-based selection
//! - **Failover**: exponential backoff reconnection with queue hand-over
//! - **Backpressure**: bounded per-connection queues, drained in batches
//! - **Pluggable transport**: any [`Connector`] implementation; `wss://`
//!   via the `native-tls` feature

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Cleanup registration and priority-ordered shutdown.
pub mod lifecycle;

/// Connection pool.
///
/// Use [`PoolBuilder::new()`] to create a configured pool.
pub mod pool;

/// Wire message types.
pub mod protocol;

/// Transport seam and WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Pool types
pub use pool::{
    ConnectionState, ConnectionStats, LoadBalancerStats, LoadBalancingStrategy, MessagePool,
    NoopPool, Pattern, PoolBuilder, PoolConfig, PoolHealth, PoolStatistics, SubscriberFn,
    SubscriptionHandle, WebSocketPool,
};

// Protocol types
pub use protocol::{InboundMessage, Message, OutboundMessage, Priority};

// Transport types
pub use transport::{Connector, OpenedTransport, Transport, TransportEvent, WebSocketConnector};

// Lifecycle types
pub use lifecycle::{
    CleanupPriority, CleanupRegistry, CleanupResource, Deregistration, ShutdownRegistry,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, MessageId, SubscriptionId};
