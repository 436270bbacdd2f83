//! Lifecycle notifications for management integration.
//!
//! The transport core exposes no metrics endpoint of its own; a management
//! layer observes pool lifetimes through this sink instead.

use strand_common::Address;

/// Receives pool lifecycle events.
///
/// Implementations are called from async context and must not block.
pub trait LifecycleSink: Send + Sync + 'static {
    /// A pool was created for `address`.
    fn on_pool_created(&self, address: &Address);

    /// The pool for `address` finished shutting down.
    fn on_pool_destroyed(&self, address: &Address);
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl LifecycleSink for NoopLifecycle {
    fn on_pool_created(&self, _address: &Address) {}

    fn on_pool_destroyed(&self, _address: &Address) {}
}
