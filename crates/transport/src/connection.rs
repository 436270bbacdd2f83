//! Connection primitives consumed by the pool.
//!
//! The transport core never touches sockets itself: it acquires
//! [`Connection`] handles from a [`Connector`] and drives them through the
//! small surface defined here. TLS, framing, and read/write loops all live
//! behind these traits.

use async_trait::async_trait;
use std::sync::Arc;
use strand_common::{Address, ConnectionId};
use thiserror::Error;

use crate::message::{Request, Response};

/// Fault reported by a connection: a refused connect, a failed write, or a
/// broken response stream.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConnectionFault(pub String);

impl ConnectionFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Codec limits handed to the transport implementation at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireLimits {
    /// Largest response the codec may assemble.
    pub max_response_size: usize,
    /// Largest header block the codec may accept.
    pub max_header_size: usize,
    /// Largest single chunk the codec may read or write.
    pub max_chunk_size: usize,
}

/// A reusable transport handle.
///
/// At most one request is in flight per connection, and the request and its
/// response are strictly ordered. Ownership of a handle moves between the
/// pool's idle set, an in-flight request, and disposal; implementations hold
/// no pool state of their own.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identity used for ownership tagging.
    fn id(&self) -> ConnectionId;

    /// Write `request` and wait for the single response-or-fault
    /// notification.
    async fn dispatch(&self, request: Request) -> Result<Response, ConnectionFault>;

    /// Close the underlying transport. Must be idempotent.
    async fn close(&self);
}

/// Opens connections on behalf of a pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `address`.
    async fn connect(
        &self,
        address: &Address,
        limits: WireLimits,
    ) -> Result<Arc<dyn Connection>, ConnectionFault>;
}
