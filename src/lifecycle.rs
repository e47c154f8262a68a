//! Coordinated shutdown of long-lived resources.
//!
//! Resources register a cleanup closure with a [`CleanupRegistry`] and get
//! a [`Deregistration`] back. At process shutdown the owner of the registry
//! calls [`ShutdownRegistry::shutdown_all`], which runs every closure in
//! priority order.
//!
//! The registry is an ordinary value passed to whatever needs it; there is
//! no process-global instance. It stores closures only, never the
//! resources themselves, so a resource holding its [`Deregistration`] does
//! not form a reference cycle with the registry.
//!
//! # Example
//!
//! ```
//! use ws_connection_pool::{CleanupPriority, CleanupRegistry, CleanupResource, ShutdownRegistry};
//!
//! let registry = ShutdownRegistry::new();
//! let handle = registry.register(CleanupResource::new(
//!     "order-feed",
//!     CleanupPriority::High,
//!     || println!("closing order feed"),
//! ));
//!
//! assert_eq!(registry.len(), 1);
//! handle.unregister();
//! assert!(registry.is_empty());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::identifiers::Sequence;

// ============================================================================
// Types
// ============================================================================

/// Cleanup callback.
pub type CleanupFn = Box<dyn Fn() + Send + Sync>;

type Entries = Mutex<Vec<Entry>>;

// ============================================================================
// CleanupPriority
// ============================================================================

/// Order in which cleanups run. Critical resources go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CleanupPriority {
    /// Runs first.
    Critical,
    /// Network connections and similar.
    High,
    /// Default.
    Normal,
    /// Runs last.
    Low,
}

// ============================================================================
// CleanupResource
// ============================================================================

/// A named cleanup entry.
pub struct CleanupResource {
    /// Identifier used in logs.
    pub id: String,
    /// Shutdown ordering.
    pub priority: CleanupPriority,
    /// Teardown routine.
    pub cleanup: CleanupFn,
}

impl CleanupResource {
    /// Creates a cleanup entry.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        priority: CleanupPriority,
        cleanup: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            cleanup: Box::new(cleanup),
        }
    }
}

impl fmt::Debug for CleanupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupResource")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Deregistration
// ============================================================================

/// Disposer returned by [`CleanupRegistry::register`].
///
/// Dropping it keeps the registration; call [`unregister`](Self::unregister)
/// to remove the entry.
#[must_use = "dropping a Deregistration leaves the cleanup registered"]
pub struct Deregistration {
    action: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Deregistration {
    /// Wraps an unregister routine.
    pub fn new(action: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A disposer that does nothing.
    pub fn noop() -> Self {
        Self { action: None }
    }

    /// Removes the registration.
    pub fn unregister(mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deregistration")
            .field("active", &self.action.is_some())
            .finish()
    }
}

// ============================================================================
// CleanupRegistry
// ============================================================================

/// Something resources can register their teardown with.
pub trait CleanupRegistry: Send + Sync {
    /// Registers a cleanup entry.
    fn register(&self, resource: CleanupResource) -> Deregistration;
}

// ============================================================================
// ShutdownRegistry
// ============================================================================

/// Registration slot.
struct Entry {
    key: u64,
    resource: CleanupResource,
}

/// Default [`CleanupRegistry`] with priority-ordered shutdown.
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone, Default)]
pub struct ShutdownRegistry {
    entries: Arc<Entries>,
    keys: Arc<Sequence>,
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Runs and removes every registered cleanup.
    ///
    /// Entries run by priority (critical first), then in registration order.
    /// A panicking cleanup is logged and does not stop the rest.
    ///
    /// Returns the number of cleanups that completed.
    pub fn shutdown_all(&self) -> usize {
        let mut entries: Vec<Entry> = self.entries.lock().drain(..).collect();
        entries.sort_by_key(|entry| (entry.resource.priority, entry.key));

        info!(count = entries.len(), "Running shutdown cleanups");

        let mut completed = 0;
        for entry in entries {
            let id = entry.resource.id;
            let cleanup = entry.resource.cleanup;

            match catch_unwind(AssertUnwindSafe(|| cleanup())) {
                Ok(()) => {
                    completed += 1;
                    debug!(%id, "Cleanup completed");
                }
                Err(_) => warn!(%id, "Cleanup panicked"),
            }
        }

        completed
    }

    /// Removes the entry with `key` from a possibly dropped registry.
    fn remove(entries: &Weak<Entries>, key: u64) {
        if let Some(entries) = entries.upgrade() {
            entries.lock().retain(|entry| entry.key != key);
        }
    }
}

impl CleanupRegistry for ShutdownRegistry {
    fn register(&self, resource: CleanupResource) -> Deregistration {
        let key = self.keys.next();
        debug!(id = %resource.id, priority = ?resource.priority, "Cleanup registered");

        self.entries.lock().push(Entry { key, resource });

        let entries = Arc::downgrade(&self.entries);
        Deregistration::new(move || Self::remove(&entries, key))
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
