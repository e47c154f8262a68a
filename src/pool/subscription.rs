//! Subscription registry and inbound dispatch.
//!
//! Subscribers register a [`Pattern`] and a callback. Every inbound message
//! is tested against every pattern; all matching callbacks run, in
//! registration order, on the task that received the frame.
//!
//! | Pattern | Tested against |
//! |---------|----------------|
//! | [`Pattern::Exact`] | message `type` (equality) |
//! | [`Pattern::Regex`] | message `type`, then the JSON-serialized `data` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::{ConnectionId, Sequence, SubscriptionId};
use crate::protocol::InboundMessage;

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback, invoked with the message and the connection it
/// arrived on.
pub type SubscriberFn = Arc<dyn Fn(&InboundMessage, &ConnectionId) + Send + Sync>;

type Entries = Mutex<Vec<SubscriptionEntry>>;

// ============================================================================
// Pattern
// ============================================================================

/// Matching rule for inbound messages.
///
/// # Example
///
/// ```
/// use ws_connection_pool::Pattern;
///
/// let exact = Pattern::from("order.created");
/// let any_order = Pattern::regex(r"^order\.").unwrap();
/// # let _ = (exact, any_order);
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches when the message type equals this string.
    Exact(String),
    /// Matches when the type or the serialized payload matches.
    Regex(Regex),
}

impl Pattern {
    /// Creates an exact pattern.
    #[inline]
    #[must_use]
    pub fn exact(message_type: impl Into<String>) -> Self {
        Self::Exact(message_type.into())
    }

    /// Compiles a regular-expression pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`](crate::Error::Pattern) if `expr` does not
    /// compile.
    pub fn regex(expr: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(expr)?))
    }

    /// Tests an inbound message.
    #[must_use]
    pub fn matches(&self, message: &InboundMessage) -> bool {
        match self {
            Self::Exact(expected) => message.message_type == *expected,
            Self::Regex(regex) => {
                regex.is_match(&message.message_type) || regex.is_match(&message.data_json())
            }
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for Pattern {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

// ============================================================================
// SubscriptionEntry
// ============================================================================

/// A standing registration.
struct SubscriptionEntry {
    id: SubscriptionId,
    pattern: Pattern,
    callback: SubscriberFn,
    /// Advisory only; dispatch ignores it.
    connection_preference: Option<ConnectionId>,
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Disposer returned by `subscribe()`.
///
/// Dropping the handle keeps the subscription. Calling
/// [`unsubscribe`](Self::unsubscribe) more than once is harmless.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    entries: Weak<Entries>,
}

impl SubscriptionHandle {
    /// A handle not attached to any registry.
    pub(crate) fn detached(id: SubscriptionId) -> Self {
        Self {
            id,
            entries: Weak::new(),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the subscription.
    pub fn unsubscribe(&self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().retain(|entry| entry.id != self.id);
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Ordered set of subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: Arc<Entries>,
    ids: Sequence,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its disposer.
    pub(crate) fn add(
        &self,
        pattern: Pattern,
        connection_preference: Option<ConnectionId>,
        callback: SubscriberFn,
    ) -> SubscriptionHandle {
        let id = SubscriptionId::new(self.ids.next());
        debug!(subscription_id = %id, %pattern, "Subscription added");

        self.entries.lock().push(SubscriptionEntry {
            id,
            pattern,
            callback,
            connection_preference,
        });

        SubscriptionHandle {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Counts subscriptions per preferred connection.
    pub(crate) fn preference_counts(&self) -> FxHashMap<ConnectionId, usize> {
        let mut counts = FxHashMap::default();
        for entry in self.entries.lock().iter() {
            if let Some(preferred) = entry.connection_preference {
                *counts.entry(preferred).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Invokes every matching callback.
    ///
    /// Callbacks run without the registry lock held, so they may subscribe
    /// or unsubscribe. A panicking callback is logged and skipped.
    ///
    /// Returns the number of matching subscriptions.
    pub(crate) fn dispatch(&self, message: &InboundMessage, connection_id: &ConnectionId) -> usize {
        let matched: Vec<(SubscriptionId, SubscriberFn)> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.pattern.matches(message))
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        trace!(
            message_type = %message.message_type,
            matched = matched.len(),
            "Dispatching inbound message"
        );

        for (id, callback) in &matched {
            if catch_unwind(AssertUnwindSafe(|| callback(message, connection_id))).is_err() {
                warn!(
                    subscription_id = %id,
                    message_type = %message.message_type,
                    "Subscriber callback panicked"
                );
            }
        }

        matched.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
