//! The transport client: pooled request dispatch and coordinated shutdown.
//!
//! [`TransportClient::send`] acquires a pooled connection, binds an
//! exactly-once timeout-guarded callback to it, transmits, and guarantees the
//! connection is returned or destroyed on every terminal path.
//! [`TransportClient::shutdown`] tears the pools down, fails every request
//! still outstanding, and forces the terminal state at the configured
//! deadline even when peers never respond.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use strand_common::{Address, RequestId, Scheduler, TokioScheduler};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::callback::{GuardedCallback, Terminal};
use crate::config::TransportConfig;
use crate::connection::{Connection, Connector};
use crate::error::{TransportError, TransportResult};
use crate::ledger::CheckoutLedger;
use crate::lifecycle::{LifecycleSink, NoopLifecycle};
use crate::manager::PoolManager;
use crate::message::{Request, Response};
use crate::pool::{Pool, PoolStats};

const RUNNING: u8 = 0;
const REQUESTS_STOPPING: u8 = 1;
const SHUTDOWN: u8 = 2;

/// Monotonic client lifecycle state; transitions only move forward.
struct LifecycleState(AtomicU8);

impl LifecycleState {
    fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    fn load(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance to `state`, returning true when this call performed the
    /// transition.
    fn advance(&self, state: u8) -> bool {
        self.0.fetch_max(state, Ordering::AcqRel) < state
    }
}

/// Builder for [`TransportClient`].
pub struct TransportClientBuilder {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    scheduler: Option<Arc<dyn Scheduler>>,
    lifecycle: Option<Arc<dyn LifecycleSink>>,
}

impl TransportClientBuilder {
    /// Override the timer scheduler.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Attach a pool lifecycle sink.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn LifecycleSink>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> TransportResult<TransportClient> {
        self.config.validate()?;

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler));
        let lifecycle = self
            .lifecycle
            .unwrap_or_else(|| Arc::new(NoopLifecycle));
        let manager = Arc::new(PoolManager::new(
            self.config.clone(),
            self.connector,
            Arc::clone(&scheduler),
            lifecycle,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(TransportClient {
            config: self.config,
            manager,
            scheduler,
            tracked: Arc::new(DashMap::new()),
            ledger: Arc::new(CheckoutLedger::new()),
            state: Arc::new(LifecycleState::new()),
            shutdown_claimed: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        })
    }
}

/// Pooled-connection transport client.
///
/// Every operation is non-blocking: `send` resolves through a completion
/// delivered later, possibly from a different task. Requests on one
/// connection are strictly ordered; there is no ordering across connections
/// or destinations.
pub struct TransportClient {
    config: TransportConfig,
    manager: Arc<PoolManager>,
    scheduler: Arc<dyn Scheduler>,
    /// Every outstanding request, so shutdown can enumerate and fail them.
    tracked: Arc<DashMap<RequestId, Arc<GuardedCallback>>>,
    ledger: Arc<CheckoutLedger>,
    state: Arc<LifecycleState>,
    shutdown_claimed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TransportClient {
    /// Build a client with the default scheduler and lifecycle sink.
    pub fn new(config: TransportConfig, connector: Arc<dyn Connector>) -> TransportResult<Self> {
        Self::builder(config, connector).build()
    }

    /// Start building a client.
    pub fn builder(config: TransportConfig, connector: Arc<dyn Connector>) -> TransportClientBuilder {
        TransportClientBuilder {
            config,
            connector,
            scheduler: None,
            lifecycle: None,
        }
    }

    /// Send `request` to `address` and resolve with the single terminal
    /// outcome: the response, an error, or a timeout.
    pub async fn send(&self, request: Request, address: Address) -> TransportResult<Response> {
        match self.state.load() {
            RUNNING => {}
            REQUESTS_STOPPING => return Err(TransportError::ShuttingDown),
            _ => return Err(TransportError::ClientShutDown),
        }

        let request_id = RequestId::new();
        let (callback, outcome) = GuardedCallback::new(request_id);
        trace!(request_id = %request_id, address = %address, "dispatching request");

        self.tracked.insert(request_id, Arc::clone(&callback));
        let tracked = Arc::clone(&self.tracked);
        callback.add_cleanup(Box::new(move |_| {
            tracked.remove(&request_id);
        }));

        // The deadline covers acquisition and creation as well as the
        // response wait.
        GuardedCallback::arm_deadline(&callback, self.scheduler.as_ref(), self.config.request_timeout());

        match self.manager.pool_for(&address) {
            Ok(pool) => self.dispatch(request, pool, Arc::clone(&callback)),
            Err(err) => {
                callback.complete(Err(err));
            }
        }

        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Internal(
                "completion channel dropped before delivery".into(),
            )),
        }
    }

    /// Point-in-time snapshot of per-destination pool counters.
    pub fn stats(&self) -> HashMap<Address, PoolStats> {
        self.manager.stats()
    }

    /// Gracefully shut down.
    ///
    /// Idempotent: concurrent and repeated callers all resolve once the
    /// terminal state is reached. The configured `shutdown_timeout_ms`
    /// bounds the wait; connections that never close are abandoned at the
    /// deadline.
    pub async fn shutdown(&self) {
        if !self.shutdown_claimed.swap(true, Ordering::AcqRel) {
            self.run_shutdown();
        }
        let mut done = self.shutdown_rx.clone();
        let _ = done.wait_for(|terminal| *terminal).await;
    }

    fn dispatch(&self, request: Request, pool: Arc<Pool>, callback: Arc<GuardedCallback>) {
        let (handle, delivery) = pool.acquire();
        // A later timeout or shutdown abandons the still-pending acquisition.
        callback.add_cleanup(Box::new(move |_| handle.cancel()));

        let ledger = Arc::clone(&self.ledger);
        let state = Arc::clone(&self.state);
        let max_response_size = self.config.max_response_size;

        tokio::spawn(async move {
            let conn = match delivery.await {
                Ok(Ok(conn)) => conn,
                Ok(Err(err)) => {
                    callback.complete(Err(err));
                    return;
                }
                // The acquisition was cancelled after the callback completed.
                Err(_) => return,
            };

            // Tag the connection with its owner, and guarantee exactly one
            // return-or-dispose on every terminal path. The connection's
            // state is unknown after a fault or timeout, so only a clean
            // success puts it back in the pool.
            ledger.tag(conn.id(), Arc::clone(&pool));
            let cleanup_ledger = Arc::clone(&ledger);
            let cleanup_conn = Arc::clone(&conn);
            callback.add_cleanup(Box::new(move |terminal| {
                if let Some(owner) = cleanup_ledger.untag(cleanup_conn.id()) {
                    match terminal {
                        Terminal::Success => owner.release(cleanup_conn),
                        Terminal::Failure => owner.dispose(cleanup_conn),
                    }
                }
            }));

            if state.load() != RUNNING {
                // The shutdown sweep may already have scanned the tracked
                // set before this connection was bound; completing here is
                // safe either way because the callback fires at most once.
                callback.complete(Err(TransportError::ShuttingDown));
                return;
            }

            match conn.dispatch(request).await {
                Ok(response) if response.len() > max_response_size => {
                    callback.complete(Err(TransportError::TransmissionFailure {
                        reason: format!(
                            "response of {} bytes exceeds limit of {} bytes",
                            response.len(),
                            max_response_size
                        ),
                    }));
                }
                Ok(response) => {
                    callback.complete(Ok(response));
                }
                Err(fault) => {
                    callback.complete(Err(TransportError::TransmissionFailure {
                        reason: fault.to_string(),
                    }));
                }
            }
        });
    }

    fn run_shutdown(&self) {
        info!(
            timeout_ms = self.config.shutdown_timeout_ms,
            "transport client shutdown initiated"
        );

        // Deadline guard: forces the terminal state even if some pools or
        // peers never confirm closure.
        let force_state = Arc::clone(&self.state);
        let force_tracked = Arc::clone(&self.tracked);
        let force_tx = self.shutdown_tx.clone();
        let force = self.scheduler.schedule(
            self.config.shutdown_timeout(),
            Box::new(move || {
                stop_requests(&force_state, &force_tracked);
                if force_state.advance(SHUTDOWN) {
                    warn!("shutdown deadline exceeded waiting for connections to close, continuing shutdown");
                }
                let _ = force_tx.send(true);
            }),
        );

        let manager = Arc::clone(&self.manager);
        let state = Arc::clone(&self.state);
        let tracked = Arc::clone(&self.tracked);
        let done_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            manager.shutdown().await;
            stop_requests(&state, &tracked);
            if state.advance(SHUTDOWN) {
                info!("transport client shutdown complete");
            }
            force.cancel();
            let _ = done_tx.send(true);
        });
    }
}

/// Advance to `REQUESTS_STOPPING` and fail every request still outstanding.
///
/// Completion is exactly-once per request, so requests that finished
/// naturally — or are hit by both the sweep and the dispatch boundary check —
/// are unaffected.
fn stop_requests(state: &LifecycleState, tracked: &DashMap<RequestId, Arc<GuardedCallback>>) {
    if state.advance(REQUESTS_STOPPING) {
        debug!(outstanding = tracked.len(), "failing outstanding requests");
    }
    let pending: Vec<Arc<GuardedCallback>> = tracked
        .iter()
        .map(|entry| Arc::clone(entry.value()))
        .collect();
    for callback in pending {
        callback.complete(Err(TransportError::ShuttingDown));
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("config", &self.config)
            .field("state", &self.state.load())
            .field("outstanding", &self.tracked.len())
            .finish()
    }
}
