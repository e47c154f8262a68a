//! Builder pattern for pool configuration.
//!
//! Provides a fluent API for configuring and creating [`WebSocketPool`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ws_connection_pool::{LoadBalancingStrategy, PoolBuilder};
//!
//! # fn example() -> ws_connection_pool::Result<()> {
//! let pool = PoolBuilder::new()
//!     .url("ws://kitchen.local:9000/orders")
//!     .url("ws://backup.local:9000/orders")
//!     .max_connections(2)
//!     .heartbeat_interval(Duration::from_secs(15))
//!     .load_balancing_strategy(LoadBalancingStrategy::RoundRobin)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::lifecycle::CleanupRegistry;
use crate::transport::{Connector, WebSocketConnector};

use super::api::MessagePool;
use super::config::{LoadBalancingStrategy, PoolConfig};
use super::core::WebSocketPool;
use super::noop::NoopPool;

// ============================================================================
// PoolBuilder
// ============================================================================

/// Builder for configuring a [`WebSocketPool`].
///
/// Starts from [`PoolConfig::default()`] with the `tokio-tungstenite`
/// connector and no cleanup registry.
#[derive(Clone)]
pub struct PoolBuilder {
    /// Settings other than URLs.
    config: PoolConfig,
    /// Endpoint URLs, parsed at build time.
    urls: Vec<String>,
    /// Transport factory; `None` selects the no-op pool.
    connector: Option<Arc<dyn Connector>>,
    /// Registry the pool registers its teardown with.
    cleanup_registry: Option<Arc<dyn CleanupRegistry>>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PoolBuilder Implementation
// ============================================================================

impl PoolBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            urls: Vec::new(),
            connector: Some(Arc::new(WebSocketConnector::new())),
            cleanup_registry: None,
        }
    }

    /// Replaces all settings with `config`, including its URLs.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.urls = config.urls.iter().map(Url::to_string).collect();
        self.config = config;
        self
    }

    /// Adds an endpoint.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Adds several endpoints.
    #[must_use]
    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls.extend(urls.into_iter().map(Into::into));
        self
    }

    /// Sets the connection cap.
    #[inline]
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Sets the reconnection budget per endpoint.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base backoff delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Caps the backoff delay. Uncapped unless set.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay = Some(delay);
        self
    }

    /// Sets the keepalive period.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Sets the open deadline.
    #[inline]
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Sets the per-connection queue capacity.
    #[inline]
    #[must_use]
    pub fn message_queue_size(mut self, size: usize) -> Self {
        self.config.message_queue_size = size;
        self
    }

    /// Sets the load balancing strategy.
    #[inline]
    #[must_use]
    pub fn load_balancing_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.config.load_balancing_strategy = strategy;
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn enable_failover(mut self, enabled: bool) -> Self {
        self.config.enable_failover = enabled;
        self
    }

    /// Sets the health sweep period.
    #[inline]
    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    /// Sets the redelivery budget for messages that do not set one.
    #[inline]
    #[must_use]
    pub fn default_max_retries(mut self, retries: u32) -> Self {
        self.config.default_max_retries = retries;
        self
    }

    /// Sets the transport factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Declares that no transport is available in this environment.
    ///
    /// [`build_dyn`](Self::build_dyn) then yields a [`NoopPool`].
    #[inline]
    #[must_use]
    pub fn no_transport(mut self) -> Self {
        self.connector = None;
        self
    }

    /// Sets the registry the pool registers its teardown with.
    #[inline]
    #[must_use]
    pub fn cleanup_registry(mut self, registry: Arc<dyn CleanupRegistry>) -> Self {
        self.cleanup_registry = Some(registry);
        self
    }

    /// Builds the pool with validation.
    ///
    /// Must be called within a tokio runtime only when the pool is later
    /// connected; building itself spawns nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if an endpoint does not parse
    /// - [`Error::Config`] if a setting is invalid or no connector is set
    pub fn build(self) -> Result<WebSocketPool> {
        let config = self.validate_config()?;
        let connector = self.connector.ok_or_else(|| {
            Error::config(
                "No transport connector configured. Use .connector() or build_dyn() \
                 for environments without a transport.",
            )
        })?;

        Ok(WebSocketPool::new(config, connector, self.cleanup_registry))
    }

    /// Builds the pool behind the [`MessagePool`] trait.
    ///
    /// Yields a [`WebSocketPool`] when a connector is configured and a
    /// [`NoopPool`] otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), except that a missing connector is
    /// not an error.
    pub fn build_dyn(self) -> Result<Arc<dyn MessagePool>> {
        if self.connector.is_none() {
            self.validate_config()?;
            return Ok(Arc::new(NoopPool::new()));
        }

        Ok(Arc::new(self.build()?))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl PoolBuilder {
    /// Parses URLs and validates settings.
    fn validate_config(&self) -> Result<PoolConfig> {
        let urls = self
            .urls
            .iter()
            .map(|raw| Url::parse(raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let config = PoolConfig {
            urls,
            ..self.config.clone()
        };
        config.validate()?;

        Ok(config)
    }
}

impl fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("urls", &self.urls)
            .field("config", &self.config)
            .field("has_connector", &self.connector.is_some())
            .field("has_cleanup_registry", &self.cleanup_registry.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
