//! Transport client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connection::WireLimits;
use crate::error::{TransportError, TransportResult};

/// Policy for choosing which idle connection to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Hand out the longest-idle connection, spreading load so the whole
    /// pool stays fresh.
    #[default]
    Lru,
    /// Hand out the most-recently-used connection, concentrating load on
    /// warm connections and letting the rest age out.
    Mru,
}

/// Construction-time configuration. Immutable once the client is built;
/// timeouts apply to every request with no per-call override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum connections per destination (active + idle).
    pub pool_size: usize,
    /// Floor each pool replenishes toward. Zero disables the floor.
    pub min_pool_size: usize,
    /// Maximum acquirers parked while a pool is at capacity.
    pub pool_waiter_size: usize,
    /// Idle connections older than this are disposed.
    pub idle_timeout_ms: u64,
    /// Maximum concurrent connect attempts per pool; excess demand queues.
    pub max_concurrent_connections: usize,
    /// Per-request deadline, covering acquisition and the response wait.
    pub request_timeout_ms: u64,
    /// Total budget for graceful shutdown before the terminal state is
    /// forced.
    pub shutdown_timeout_ms: u64,
    /// Responses larger than this fault the request and dispose the
    /// connection.
    pub max_response_size: usize,
    /// Handed to the connector for the wire codec.
    pub max_header_size: usize,
    /// Handed to the connector for the wire codec.
    pub max_chunk_size: usize,
    /// Idle connection selection policy.
    pub strategy: Strategy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_size: 200,
            min_pool_size: 0,
            pool_waiter_size: 32_768,
            idle_timeout_ms: 25_000,
            max_concurrent_connections: 64,
            request_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            max_response_size: 2 * 1024 * 1024,
            max_header_size: 8 * 1024,
            max_chunk_size: 8 * 1024,
            strategy: Strategy::Lru,
        }
    }
}

impl TransportConfig {
    /// Validate the configuration, rejecting combinations the pool cannot
    /// honor.
    pub fn validate(&self) -> TransportResult<()> {
        if self.pool_size == 0 {
            return Err(TransportError::Config("pool_size must be at least 1".into()));
        }
        if self.min_pool_size > self.pool_size {
            return Err(TransportError::Config(format!(
                "min_pool_size ({}) exceeds pool_size ({})",
                self.min_pool_size, self.pool_size
            )));
        }
        if self.max_concurrent_connections == 0 {
            return Err(TransportError::Config(
                "max_concurrent_connections must be at least 1".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(TransportError::Config("request_timeout_ms must be nonzero".into()));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(TransportError::Config("shutdown_timeout_ms must be nonzero".into()));
        }
        if self.idle_timeout_ms == 0 {
            return Err(TransportError::Config("idle_timeout_ms must be nonzero".into()));
        }
        if self.max_response_size == 0 || self.max_header_size == 0 || self.max_chunk_size == 0 {
            return Err(TransportError::Config("wire size limits must be nonzero".into()));
        }
        Ok(())
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub(crate) fn wire_limits(&self) -> WireLimits {
        WireLimits {
            max_response_size: self.max_response_size,
            max_header_size: self.max_header_size,
            max_chunk_size: self.max_chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TransportConfig::default().validate().is_ok());
    }

    #[test]
    fn min_pool_size_bounded_by_pool_size() {
        let config = TransportConfig {
            pool_size: 2,
            min_pool_size: 3,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn zero_pool_size_rejected() {
        let config = TransportConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn strategy_serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Strategy::Lru).unwrap(), "\"lru\"");
        assert_eq!(
            serde_json::from_str::<Strategy>("\"mru\"").unwrap(),
            Strategy::Mru
        );
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = TransportConfig {
            pool_size: 8,
            strategy: Strategy::Mru,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: TransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
