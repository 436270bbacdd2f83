//! Pooled-connection transport client for the strand RPC framework.
//!
//! This crate issues outbound requests over a bounded set of reusable
//! connections per destination, enforces per-request timeouts, and supports
//! a graceful, deadline-bounded shutdown that terminates all outstanding
//! work exactly once.
//!
//! # Components
//!
//! - [`pool::Pool`]: bounded per-destination connection pool with a FIFO
//!   waiter queue and an LRU/MRU handout strategy
//! - [`manager::PoolManager`]: lazy `Address → Pool` mapping with aggregated
//!   shutdown and stats
//! - [`callback::GuardedCallback`]: exactly-once, timeout-guarded completion
//! - [`client::TransportClient`]: the public `send` / `stats` / `shutdown`
//!   surface
//!
//! The raw transport is supplied by the caller through the
//! [`connection::Connector`] and [`connection::Connection`] traits; TLS,
//! framing, and socket I/O never enter this crate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strand_common::Address;
//! use strand_transport::{Request, TransportClient, TransportConfig};
//! # use strand_transport::{Connection, ConnectionFault, Connector, WireLimits};
//! # struct MyConnector;
//! # #[async_trait::async_trait]
//! # impl Connector for MyConnector {
//! #     async fn connect(&self, _: &Address, _: WireLimits)
//! #         -> Result<Arc<dyn Connection>, ConnectionFault> { unimplemented!() }
//! # }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = TransportClient::new(TransportConfig::default(), Arc::new(MyConnector))?;
//!
//! let response = client
//!     .send(Request::new("ping"), Address::new("10.0.0.1:7443"))
//!     .await?;
//! println!("{} byte response", response.len());
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
mod ledger;
pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod pool;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export the public surface at the crate root
pub use callback::{CleanupTask, GuardedCallback, Terminal};
pub use client::{TransportClient, TransportClientBuilder};
pub use config::{Strategy, TransportConfig};
pub use connection::{Connection, ConnectionFault, Connector, WireLimits};
pub use error::{TransportError, TransportResult};
pub use lifecycle::{LifecycleSink, NoopLifecycle};
pub use manager::PoolManager;
pub use message::{Request, Response};
pub use pool::{AcquireHandle, Pool, PoolStats};
