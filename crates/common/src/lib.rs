//! Common utilities and shared components for the strand RPC framework.
//!
//! This crate provides the infrastructure shared by strand's transport
//! components:
//!
//! - [`ids`]: Type-safe identifier newtypes (Address, RequestId, ConnectionId)
//! - [`scheduler`]: Delayed-task scheduling abstraction with a tokio-backed
//!   default implementation
//! - [`observability`]: Logging and tracing initialization

pub mod ids;
pub mod observability;
pub mod scheduler;

// Re-export commonly used items at the crate root
pub use ids::{Address, ConnectionId, RequestId};
pub use observability::init_tracing;
pub use scheduler::{DelayedTask, ScheduledHandle, Scheduler, TokioScheduler};
