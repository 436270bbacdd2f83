//! Exactly-once, timeout-guarded completion for one outstanding request.
//!
//! A [`GuardedCallback`] sits between every completion source (application
//! response, transmission fault, deadline timer, shutdown sweep) and the
//! caller. Whichever source completes first wins an atomic transition; the
//! winner cancels the deadline, runs the accumulated cleanup tasks in
//! registration order, and delivers the outcome. Every later competitor is a
//! no-op.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_common::{RequestId, ScheduledHandle, Scheduler};
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{TransportError, TransportResult};
use crate::message::Response;

/// How a request ended, as seen by cleanup tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The caller received a response.
    Success,
    /// The caller received an error, timeout, or shutdown failure.
    Failure,
}

/// Cleanup action run exactly once at the winning transition.
pub type CleanupTask = Box<dyn FnOnce(Terminal) + Send>;

const ARMED: u8 = 0;
const COMPLETED_SUCCESS: u8 = 1;
const COMPLETED_FAILURE: u8 = 2;

/// Exactly-once completion guard for a single request.
///
/// State machine: `ARMED → COMPLETED` (terminal). The transition is a
/// single-winner compare-and-set on the completion flag; the whole object is
/// never locked around completion.
pub struct GuardedCallback {
    request_id: RequestId,
    state: AtomicU8,
    cleanups: Mutex<Vec<CleanupTask>>,
    outcome: Mutex<Option<oneshot::Sender<TransportResult<Response>>>>,
    deadline: Mutex<Option<ScheduledHandle>>,
}

impl GuardedCallback {
    /// Create an armed callback and the receiver its outcome will be
    /// delivered on.
    pub fn new(request_id: RequestId) -> (Arc<Self>, oneshot::Receiver<TransportResult<Response>>) {
        let (tx, rx) = oneshot::channel();
        let callback = Arc::new(Self {
            request_id,
            state: AtomicU8::new(ARMED),
            cleanups: Mutex::new(Vec::new()),
            outcome: Mutex::new(Some(tx)),
            deadline: Mutex::new(None),
        });
        (callback, rx)
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Arm the deadline timer. If it fires before any other transition it
    /// wins and delivers [`TransportError::RequestTimeout`]; any other winner
    /// cancels it.
    pub fn arm_deadline(this: &Arc<Self>, scheduler: &dyn Scheduler, timeout: Duration) {
        let callback = Arc::clone(this);
        let handle = scheduler.schedule(
            timeout,
            Box::new(move || {
                callback.complete(Err(TransportError::RequestTimeout(timeout)));
            }),
        );
        *this.deadline.lock() = Some(handle);

        // The callback may have completed while the timer was being armed;
        // the winner has already drained a then-empty slot, so disarm here.
        if this.state.load(Ordering::Acquire) != ARMED {
            if let Some(handle) = this.deadline.lock().take() {
                handle.cancel();
            }
        }
    }

    /// Register a cleanup task.
    ///
    /// Tasks accumulate in registration order and all run exactly once at
    /// the winning transition, before the outcome is delivered. A task
    /// registered after completion runs immediately with the recorded
    /// terminal disposition.
    pub fn add_cleanup(&self, task: CleanupTask) {
        let run_now = {
            let mut cleanups = self.cleanups.lock();
            if self.state.load(Ordering::Acquire) == ARMED {
                cleanups.push(task);
                None
            } else {
                Some(task)
            }
        };
        if let Some(task) = run_now {
            task(self.terminal_kind());
        }
    }

    /// Attempt the terminal transition with `outcome`.
    ///
    /// Returns true if this call won; losers are no-ops and their outcome is
    /// dropped.
    pub fn complete(&self, outcome: TransportResult<Response>) -> bool {
        let next = if outcome.is_ok() {
            COMPLETED_SUCCESS
        } else {
            COMPLETED_FAILURE
        };
        if self
            .state
            .compare_exchange(ARMED, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(request_id = %self.request_id, "completion lost the terminal race");
            return false;
        }

        if let Some(deadline) = self.deadline.lock().take() {
            deadline.cancel();
        }

        let kind = self.terminal_kind();
        let tasks = std::mem::take(&mut *self.cleanups.lock());
        for task in tasks {
            task(kind);
        }

        if let Some(tx) = self.outcome.lock().take() {
            // The caller may have gone away; the outcome is then dropped.
            let _ = tx.send(outcome);
        }
        true
    }

    /// True once a terminal transition has happened.
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) != ARMED
    }

    fn terminal_kind(&self) -> Terminal {
        if self.state.load(Ordering::Acquire) == COMPLETED_SUCCESS {
            Terminal::Success
        } else {
            Terminal::Failure
        }
    }
}

impl std::fmt::Debug for GuardedCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedCallback")
            .field("request_id", &self.request_id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use strand_common::TokioScheduler;

    fn new_callback() -> (Arc<GuardedCallback>, oneshot::Receiver<TransportResult<Response>>) {
        GuardedCallback::new(RequestId::new())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn racing_completions_deliver_exactly_once() {
        for _ in 0..200 {
            let (callback, rx) = new_callback();
            let cleanup_runs = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&cleanup_runs);
            callback.add_cleanup(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

            let winner = Arc::clone(&callback);
            let loser = Arc::clone(&callback);
            let a = tokio::spawn(async move { winner.complete(Ok(Response::new("ok"))) });
            let b = tokio::spawn(async move {
                loser.complete(Err(TransportError::RequestTimeout(Duration::from_millis(50))))
            });

            let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());
            assert!(won_a ^ won_b, "exactly one competitor must win");
            assert_eq!(cleanup_runs.load(Ordering::SeqCst), 1);

            let delivered = rx.await.unwrap();
            match delivered {
                Ok(response) => {
                    assert!(won_a);
                    assert_eq!(response.payload().as_ref(), b"ok");
                }
                Err(TransportError::RequestTimeout(_)) => assert!(won_b),
                Err(other) => panic!("unexpected outcome: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn cleanups_run_in_registration_order_before_delivery() {
        let (callback, rx) = new_callback();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            callback.add_cleanup(Box::new(move |terminal| {
                assert_eq!(terminal, Terminal::Failure);
                order.lock().push(label);
            }));
        }

        assert!(callback.complete(Err(TransportError::ShuttingDown)));
        // Cleanups ran before the outcome was observable.
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
        assert!(matches!(rx.await.unwrap(), Err(TransportError::ShuttingDown)));
    }

    #[tokio::test]
    async fn late_cleanup_runs_immediately_with_recorded_disposition() {
        let (callback, rx) = new_callback();
        assert!(callback.complete(Ok(Response::new("done"))));
        assert!(rx.await.is_ok());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        callback.add_cleanup(Box::new(move |terminal| {
            assert_eq!(terminal, Terminal::Success);
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn losing_completion_is_a_noop() {
        let (callback, rx) = new_callback();
        assert!(callback.complete(Ok(Response::new("winner"))));
        assert!(!callback.complete(Err(TransportError::ShuttingDown)));
        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.payload().as_ref(), b"winner");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_when_nothing_else_completes() {
        let (callback, rx) = new_callback();
        GuardedCallback::arm_deadline(&callback, &TokioScheduler, Duration::from_millis(50));

        let delivered = rx.await.unwrap();
        assert!(matches!(
            delivered,
            Err(TransportError::RequestTimeout(timeout)) if timeout == Duration::from_millis(50)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn success_disarms_the_deadline() {
        let (callback, rx) = new_callback();
        GuardedCallback::arm_deadline(&callback, &TokioScheduler, Duration::from_millis(50));

        assert!(callback.complete(Ok(Response::new("fast"))));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.payload().as_ref(), b"fast");
    }
}
