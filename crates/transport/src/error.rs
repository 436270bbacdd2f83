//! Error types for the strand transport client.

use std::time::Duration;
use strand_common::Address;
use thiserror::Error;

/// Result alias used throughout the transport crate.
pub type TransportResult<T> = Result<T, TransportError>;

/// Terminal failures a request or pool operation can surface.
///
/// Every failure is delivered through the same exactly-once completion
/// channel a response would be; no built-in retry is performed.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Invalid construction-time configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The pool is at capacity and its waiter queue is full.
    #[error("pool exhausted for {address}: waiter queue full ({capacity} waiters)")]
    PoolExhausted { address: Address, capacity: usize },

    /// The underlying connect attempt failed.
    #[error("connection creation failed for {address}: {reason}")]
    PoolCreationFailed { address: Address, reason: String },

    /// The per-request deadline elapsed before any other outcome.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Rejected because shutdown has been initiated.
    #[error("request rejected: transport is shutting down")]
    ShuttingDown,

    /// Write fault after a connection was acquired.
    #[error("transmission failed: {reason}")]
    TransmissionFailure { reason: String },

    /// The owning pool began shutdown while the operation was pending.
    #[error("pool for {address} is shutting down")]
    PoolShuttingDown { address: Address },

    /// The pool manager itself has shut down.
    #[error("pool manager unavailable")]
    ManagerUnavailable,

    /// The client reached its terminal state; no further sends are possible.
    #[error("transport client has shut down")]
    ClientShutDown,

    /// Invariant violation inside the transport; not recoverable by callers.
    #[error("internal transport error: {0}")]
    Internal(String),
}

impl TransportError {
    /// True for failures synthesized by shutdown rather than by the request
    /// itself.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown
                | Self::PoolShuttingDown { .. }
                | Self::ManagerUnavailable
                | Self::ClientShutDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_classification() {
        assert!(TransportError::ShuttingDown.is_shutdown());
        assert!(TransportError::ClientShutDown.is_shutdown());
        assert!(TransportError::ManagerUnavailable.is_shutdown());
        assert!(TransportError::PoolShuttingDown {
            address: Address::new("a:1"),
        }
        .is_shutdown());
        assert!(!TransportError::RequestTimeout(Duration::from_millis(50)).is_shutdown());
        assert!(!TransportError::PoolExhausted {
            address: Address::new("a:1"),
            capacity: 0,
        }
        .is_shutdown());
    }

    #[test]
    fn display_names_the_address() {
        let err = TransportError::PoolCreationFailed {
            address: Address::new("db.internal:5432"),
            reason: "connection refused".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("db.internal:5432"));
        assert!(rendered.contains("connection refused"));
    }
}
