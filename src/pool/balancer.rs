//! Connection selection.
//!
//! The balancer picks one connection per outbound message. It considers
//! `Connected` connections first. If none are connected but the pool still
//! tracks connections that are opening or waiting to reconnect, it picks
//! among those instead, so the message is queued where delivery will
//! resume. An empty pool yields `None`.

// ============================================================================
// Imports
// ============================================================================

use super::config::LoadBalancingStrategy;
use super::connection::PooledConnection;
use super::stats::LoadBalancerStats;

// ============================================================================
// LoadBalancer
// ============================================================================

/// Strategy plus round-robin cursor.
#[derive(Debug, Clone)]
pub(crate) struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    cursor: usize,
}

impl LoadBalancer {
    pub(crate) fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            cursor: 0,
        }
    }

    /// Returns the index of the chosen connection.
    pub(crate) fn select(&mut self, connections: &[PooledConnection]) -> Option<usize> {
        let mut candidates: Vec<usize> = connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_connected())
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            candidates = (0..connections.len()).collect();
        }

        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            LoadBalancingStrategy::RoundRobin => self.select_round_robin(&candidates),
            LoadBalancingStrategy::LeastConnections => {
                Self::select_least_queued(connections, &candidates)
            }
            LoadBalancingStrategy::HealthBased => Self::select_healthiest(connections, &candidates),
        };

        Some(chosen)
    }

    pub(crate) fn stats(&self) -> LoadBalancerStats {
        LoadBalancerStats {
            strategy: self.strategy,
            cursor: self.cursor,
        }
    }

    /// Round-robin: cursor modulo candidate count.
    fn select_round_robin(&mut self, candidates: &[usize]) -> usize {
        let idx = candidates[self.cursor % candidates.len()];
        self.cursor = self.cursor.wrapping_add(1);
        idx
    }

    /// Least-connections: shortest queue, first one wins ties.
    fn select_least_queued(connections: &[PooledConnection], candidates: &[usize]) -> usize {
        candidates
            .iter()
            .copied()
            .min_by_key(|&idx| connections[idx].queue.len())
            .unwrap_or(candidates[0])
    }

    /// Health-based: highest score, first one wins ties.
    fn select_healthiest(connections: &[PooledConnection], candidates: &[usize]) -> usize {
        let mut best = candidates[0];
        for &idx in &candidates[1..] {
            if connections[idx].health > connections[best].health {
                best = idx;
            }
        }
        best
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;
    use url::Url;

    use crate::identifiers::MessageId;
    use crate::pool::connection::testing::connected;
    use crate::pool::queue::MessageQueue;
    use crate::protocol::{Message, OutboundMessage};

    fn pool_of(n: usize) -> Vec<PooledConnection> {
        (0..n)
            .map(|i| connected(&format!("ws://node-{i}.local")).0)
            .collect()
    }

    fn enqueue(connection: &mut PooledConnection, count: u64) {
        for id in 0..count {
            let message =
                OutboundMessage::stamp(MessageId::new(id), Message::new("t", Value::Null), 3);
            connection.queue.push(message).unwrap();
        }
    }

    #[test]
    fn test_empty_pool_yields_none() {
        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::HealthBased);
        assert_eq!(balancer.select(&[]), None);
    }

    #[tokio::test]
    async fn test_round_robin_is_fair() {
        let connections = pool_of(3);
        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);

        let mut hits = [0usize; 3];
        for _ in 0..9 {
            hits[balancer.select(&connections).unwrap()] += 1;
        }
        assert_eq!(hits, [3, 3, 3]);
        assert_eq!(balancer.stats().cursor, 9);
    }

    #[tokio::test]
    async fn test_round_robin_skips_disconnected() {
        let mut connections = pool_of(3);
        connections[1].mark_disconnected("closed");
        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);

        let picks: Vec<_> = (0..4).map(|_| balancer.select(&connections).unwrap()).collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
    }

    #[tokio::test]
    async fn test_least_connections_prefers_short_queue() {
        let mut connections = pool_of(3);
        enqueue(&mut connections[0], 4);
        enqueue(&mut connections[1], 1);
        enqueue(&mut connections[2], 1);

        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastConnections);
        assert_eq!(balancer.select(&connections), Some(1));
    }

    #[tokio::test]
    async fn test_health_based_prefers_healthiest() {
        let mut connections = pool_of(3);
        connections[0].penalize(0.3);
        connections[1].penalize(0.1);
        connections[2].penalize(0.1);

        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::HealthBased);
        assert_eq!(balancer.select(&connections), Some(1));
    }

    #[tokio::test]
    async fn test_health_based_tie_goes_to_first() {
        let connections = pool_of(3);
        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::HealthBased);
        assert_eq!(balancer.select(&connections), Some(0));
    }

    #[tokio::test]
    async fn test_falls_back_to_tracked_connections() {
        let mut connections = vec![PooledConnection::new(
            Url::parse("ws://a.local").unwrap(),
            0,
            MessageQueue::new(10),
        )];
        connections.push(connected("ws://b.local").0);
        connections[1].mark_disconnected("closed");

        let mut balancer = LoadBalancer::new(LoadBalancingStrategy::HealthBased);
        assert_eq!(balancer.select(&connections), Some(0));
    }
}
