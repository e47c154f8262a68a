//! Pool configuration.
//!
//! [`PoolConfig`] is fixed once the pool is built. Use
//! [`PoolBuilder`](super::PoolBuilder) to assemble and validate one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default connection cap.
pub const DEFAULT_MAX_CONNECTIONS: usize = 3;

/// Default reconnection budget per endpoint.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base backoff delay.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default keepalive period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default open deadline.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-connection queue capacity.
pub const DEFAULT_MESSAGE_QUEUE_SIZE: usize = 1000;

/// Default health sweep period.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default redelivery budget for queued messages.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// LoadBalancingStrategy
// ============================================================================

/// How outbound messages are spread over connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Rotate through connections in order.
    RoundRobin,
    /// Pick the connection with the shortest queue.
    LeastConnections,
    /// Pick the connection with the best health score.
    #[default]
    HealthBased,
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoundRobin => "round-robin",
            Self::LeastConnections => "least-connections",
            Self::HealthBased => "health-based",
        };
        f.write_str(name)
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Construction-time pool settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Endpoints; at most `max_connections` of them are opened.
    pub urls: Vec<Url>,
    /// Hard cap on tracked connections.
    pub max_connections: usize,
    /// Reconnection budget per endpoint.
    pub max_reconnect_attempts: u32,
    /// Base backoff delay; doubles per attempt.
    pub reconnect_delay: Duration,
    /// Optional ceiling on the computed backoff delay. `None` keeps the
    /// delay doubling without bound.
    pub max_reconnect_delay: Option<Duration>,
    /// Keepalive period.
    pub heartbeat_interval: Duration,
    /// Time allowed for an open to complete.
    pub connection_timeout: Duration,
    /// Per-connection queue capacity.
    pub message_queue_size: usize,
    /// Connection selection strategy.
    pub load_balancing_strategy: LoadBalancingStrategy,
    /// Whether closed connections are retried.
    pub enable_failover: bool,
    /// Health decay and queue drain period.
    pub health_check_interval: Duration,
    /// Redelivery budget when a message does not set one.
    pub default_max_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            message_queue_size: DEFAULT_MESSAGE_QUEUE_SIZE,
            load_balancing_strategy: LoadBalancingStrategy::default(),
            enable_failover: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl PoolConfig {
    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }

        if self.message_queue_size == 0 {
            return Err(Error::config("message_queue_size must be at least 1"));
        }

        for (name, value) in [
            ("reconnect_delay", self.reconnect_delay),
            ("heartbeat_interval", self.heartbeat_interval),
            ("connection_timeout", self.connection_timeout),
            ("health_check_interval", self.health_check_interval),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be non-zero")));
            }
        }

        if let Some(max) = self.max_reconnect_delay
            && self.reconnect_delay > max
        {
            return Err(Error::config(format!(
                "reconnect_delay ({}ms) exceeds max_reconnect_delay ({}ms)",
                self.reconnect_delay.as_millis(),
                max.as_millis()
            )));
        }

        if let Some(url) = self
            .urls
            .iter()
            .find(|url| !matches!(url.scheme(), "ws" | "wss"))
        {
            return Err(Error::config(format!(
                "Unsupported scheme in {url}: expected ws or wss"
            )));
        }

        Ok(())
    }

    /// Silence threshold after which the health sweep penalizes a connection.
    #[inline]
    #[must_use]
    pub fn inactivity_threshold(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.load_balancing_strategy, LoadBalancingStrategy::HealthBased);
        assert!(config.enable_failover);
        assert_eq!(config.max_reconnect_delay, None, "backoff is uncapped by default");
    }

    #[test]
    fn test_zero_connections_rejected() {
        let config = PoolConfig {
            max_connections: 0,
            ..PoolConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PoolConfig {
            heartbeat_interval: Duration::ZERO,
            ..PoolConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval"));
    }

    #[test]
    fn test_http_scheme_rejected() {
        let config = PoolConfig {
            urls: vec![Url::parse("http://localhost:8080").unwrap()],
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_ceiling_below_base_rejected() {
        let config = PoolConfig {
            reconnect_delay: Duration::from_secs(10),
            max_reconnect_delay: Some(Duration::from_secs(1)),
            ..PoolConfig::default()
        };
        let err = assert_err!(config.validate());
        assert!(err.to_string().contains("max_reconnect_delay"));
    }

    #[test]
    fn test_inactivity_threshold() {
        let config = PoolConfig {
            heartbeat_interval: Duration::from_secs(15),
            ..PoolConfig::default()
        };
        assert_eq!(config.inactivity_threshold(), Duration::from_secs(30));
    }

    #[test]
    fn test_strategy_display_and_serde() {
        assert_eq!(LoadBalancingStrategy::RoundRobin.to_string(), "round-robin");
        let json = serde_json::to_string(&LoadBalancingStrategy::LeastConnections).unwrap();
        assert_eq!(json, r#""least-connections""#);
    }
}
