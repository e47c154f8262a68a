//! Pool for environments without a transport.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, Sequence, SubscriptionId};
use crate::protocol::Message;

use super::api::MessagePool;
use super::stats::{PoolHealth, PoolStatistics};
use super::subscription::{Pattern, SubscriberFn, SubscriptionHandle};

// ============================================================================
// NoopPool
// ============================================================================

/// [`MessagePool`] that never connects.
///
/// `connect()` and `send()` report `false`, snapshots are `None` and
/// subscriptions are accepted but never fire.
#[derive(Debug, Default)]
pub struct NoopPool {
    subscription_ids: Sequence,
}

impl NoopPool {
    /// Creates a no-op pool.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePool for NoopPool {
    async fn connect(&self) -> bool {
        debug!("No transport available, pool stays disconnected");
        false
    }

    fn send(&self, _message: Message) -> bool {
        false
    }

    fn try_send(&self, _message: Message) -> Result<MessageId> {
        Err(Error::NoConnectionAvailable)
    }

    fn subscribe(&self, _pattern: Pattern, _callback: SubscriberFn) -> SubscriptionHandle {
        SubscriptionHandle::detached(SubscriptionId::new(self.subscription_ids.next()))
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}

    fn health_status(&self) -> Option<PoolHealth> {
        None
    }

    fn statistics(&self) -> Option<PoolStatistics> {
        None
    }

    fn disconnect(&self) {}
}

// ============================================================================
// Tests
// ============================================================================
