//! Read-only pool snapshots.
//!
//! Building a snapshot never changes pool state.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::identifiers::ConnectionId;

use super::config::LoadBalancingStrategy;
use super::connection::ConnectionState;

// ============================================================================
// PoolHealth
// ============================================================================

/// Aggregate pool health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHealth {
    /// Connections currently tracked, in any state.
    pub total_connections: usize,
    /// Connections in the `connected` state.
    pub active_connections: usize,
    /// Connections in the `failed` state.
    pub failed_connections: usize,
    /// Mean health over tracked connections; `0.0` when there are none.
    pub average_health: f64,
    /// Messages waiting in all queues.
    pub queued_messages: usize,
    /// Messages written since the pool was built, retired connections included.
    pub messages_sent: u64,
    /// Frames received since the pool was built, retired connections included.
    pub messages_received: u64,
}

// ============================================================================
// ConnectionStats
// ============================================================================

/// Snapshot of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Connection ID.
    pub id: ConnectionId,
    /// Target endpoint.
    pub url: String,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Health score in `[0, 1]`.
    pub health: f64,
    /// Messages written on this connection.
    pub messages_sent: u64,
    /// Frames received on this connection.
    pub messages_received: u64,
    /// Messages waiting in this connection's queue.
    pub queued_messages: usize,
    /// Consecutive reconnection attempts on this endpoint.
    pub reconnect_attempts: u32,
    /// Milliseconds since the last send or receive.
    pub idle_ms: u64,
    /// Most recent error, if any.
    pub last_error: Option<String>,
    /// Subscriptions naming this connection as preferred.
    pub preferred_by: usize,
}

// ============================================================================
// LoadBalancerStats
// ============================================================================

/// Load balancer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStats {
    /// Active strategy.
    pub strategy: LoadBalancingStrategy,
    /// Round-robin cursor.
    pub cursor: usize,
}

// ============================================================================
// PoolStatistics
// ============================================================================

/// Detailed pool snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatistics {
    /// Aggregate health.
    pub health: PoolHealth,
    /// Per-connection detail keyed by connection ID.
    pub connections: BTreeMap<ConnectionId, ConnectionStats>,
    /// Load balancer state.
    pub load_balancer: LoadBalancerStats,
    /// Registered subscriptions.
    pub subscriptions: usize,
}

// ============================================================================
// Tests
// ============================================================================
