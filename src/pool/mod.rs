//! Connection pool.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `api` | `MessagePool` trait |
//! | `balancer` | Connection selection strategies |
//! | `builder` | Fluent `PoolBuilder` |
//! | `config` | `PoolConfig` and defaults |
//! | `connection` | Per-connection state machine and health |
//! | `core` | `WebSocketPool` |
//! | `monitor` | Heartbeat and health-sweep tasks |
//! | `noop` | `NoopPool` for environments without a transport |
//! | `queue` | Bounded outbound queue |
//! | `stats` | Read-only snapshots |
//! | `subscription` | Patterns and dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Object-safe pool trait.
pub mod api;

mod balancer;

/// Pool builder.
pub mod builder;

/// Pool configuration.
pub mod config;

mod connection;

mod core;

mod monitor;

/// No-op pool.
pub mod noop;

mod queue;

/// Pool snapshots.
pub mod stats;

/// Subscription patterns and handles.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::MessagePool;
pub use builder::PoolBuilder;
pub use config::{LoadBalancingStrategy, PoolConfig};
pub use connection::ConnectionState;
pub use core::WebSocketPool;
pub use noop::NoopPool;
pub use stats::{ConnectionStats, LoadBalancerStats, PoolHealth, PoolStatistics};
pub use subscription::{Pattern, SubscriberFn, SubscriptionHandle};
