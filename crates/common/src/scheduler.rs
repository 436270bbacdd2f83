//! Delayed-task scheduling behind a trait seam.
//!
//! Every timer in the transport (request deadlines, idle sweeps, the shutdown
//! force timer) is armed through [`Scheduler`] rather than calling into the
//! runtime directly. The default [`TokioScheduler`] drives tasks with
//! `tokio::time`, which means tests running under
//! `#[tokio::test(start_paused = true)]` get deterministic virtual time for
//! free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// A deferred unit of work handed to a [`Scheduler`].
pub type DelayedTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules a task to run once after a delay, with cancellation.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` after `delay` has elapsed.
    ///
    /// The returned handle cancels the task if it has not already run;
    /// cancelling after the task ran is a no-op.
    fn schedule(&self, delay: Duration, task: DelayedTask) -> ScheduledHandle;
}

/// Cancellation handle for a scheduled task.
#[derive(Debug)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl ScheduledHandle {
    /// Build a handle from a cancellation flag and an optional abort handle
    /// for the backing task.
    pub fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    /// Prevent the task from running. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

/// [`Scheduler`] backed by `tokio::time`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: DelayedTask) -> ScheduledHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::Acquire) {
                task();
            }
        });
        ScheduledHandle::new(cancelled, Some(join.abort_handle()))
    }
}
