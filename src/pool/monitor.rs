//! Heartbeat and health-sweep tasks.
//!
//! Two independent interval loops, each holding only a `Weak` pool
//! reference. A loop exits on its own once the pool is dropped; teardown
//! aborts both through [`Monitor::stop`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use super::core::PoolInner;

// ============================================================================
// Monitor
// ============================================================================

/// Handles of the two recurring monitor tasks.
#[derive(Debug)]
pub(crate) struct Monitor {
    heartbeat: JoinHandle<()>,
    health: JoinHandle<()>,
}

impl Monitor {
    /// Spawns both loops. The first tick of each fires one full period
    /// after start.
    pub(crate) fn start(
        pool: Weak<PoolInner>,
        heartbeat_interval: Duration,
        health_check_interval: Duration,
    ) -> Self {
        info!(
            heartbeat_ms = heartbeat_interval.as_millis() as u64,
            health_check_ms = health_check_interval.as_millis() as u64,
            "Pool monitor started"
        );

        let heartbeat = tokio::spawn(heartbeat_loop(pool.clone(), heartbeat_interval));
        let health = tokio::spawn(health_loop(pool, health_check_interval));

        Self { heartbeat, health }
    }

    /// Aborts both loops.
    pub(crate) fn stop(self) {
        self.heartbeat.abort();
        self.health.abort();
        debug!("Pool monitor stopped");
    }
}

// ============================================================================
// Loops
// ============================================================================

async fn heartbeat_loop(pool: Weak<PoolInner>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip immediate first tick
    timer.tick().await;

    loop {
        timer.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.broadcast_heartbeat();
    }

    debug!("Heartbeat loop exited");
}

async fn health_loop(pool: Weak<PoolInner>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip immediate first tick
    timer.tick().await;

    loop {
        timer.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.health_sweep();
    }

    debug!("Health loop exited");
}
