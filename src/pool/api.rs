//! Object-safe pool surface.
//!
//! [`MessagePool`] is what callers hold when the transport capability is
//! decided at build time: [`WebSocketPool`] where a connector exists,
//! [`NoopPool`](super::NoopPool) where it does not.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::{MessageId, SubscriptionId};
use crate::protocol::Message;

use super::core::WebSocketPool;
use super::stats::{PoolHealth, PoolStatistics};
use super::subscription::{Pattern, SubscriberFn, SubscriptionHandle};

// ============================================================================
// MessagePool
// ============================================================================

/// Pool operations independent of the transport backing them.
#[async_trait]
pub trait MessagePool: Send + Sync {
    /// Opens the configured endpoints. Returns `true` if any is active.
    async fn connect(&self) -> bool;

    /// Sends a message. Returns `true` if it was written or queued.
    fn send(&self, message: Message) -> bool;

    /// Sends a message, reporting why it was rejected.
    ///
    /// # Errors
    ///
    /// Implementation specific; see [`WebSocketPool::try_send`].
    fn try_send(&self, message: Message) -> Result<MessageId>;

    /// Registers a subscriber.
    fn subscribe(&self, pattern: Pattern, callback: SubscriberFn) -> SubscriptionHandle;

    /// Removes a subscriber by ID.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Aggregate health, or `None` without a transport.
    fn health_status(&self) -> Option<PoolHealth>;

    /// Detailed snapshot, or `None` without a transport.
    fn statistics(&self) -> Option<PoolStatistics>;

    /// Tears the pool down.
    fn disconnect(&self);
}

#[async_trait]
impl MessagePool for WebSocketPool {
    async fn connect(&self) -> bool {
        WebSocketPool::connect(self).await
    }

    fn send(&self, message: Message) -> bool {
        WebSocketPool::send(self, message)
    }

    fn try_send(&self, message: Message) -> Result<MessageId> {
        WebSocketPool::try_send(self, message)
    }

    fn subscribe(&self, pattern: Pattern, callback: SubscriberFn) -> SubscriptionHandle {
        WebSocketPool::subscribe(self, pattern, callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        WebSocketPool::unsubscribe(self, id);
    }

    fn health_status(&self) -> Option<PoolHealth> {
        WebSocketPool::health_status(self)
    }

    fn statistics(&self) -> Option<PoolStatistics> {
        WebSocketPool::statistics(self)
    }

    fn disconnect(&self) {
        WebSocketPool::disconnect(self);
    }
}
