//! Bounded, reusable connection pool for a single destination.
//!
//! The pool owns three populations — idle connections, checked-out (active)
//! connections, and in-flight creations — plus a FIFO queue of parked
//! acquirers. At all times `active + idle ≤ pool_size`; creations are capped
//! by `max_concurrent_connections`, with excess demand queued behind the cap.
//! Every operation returns without waiting: delivery happens through oneshot
//! channels resolved later.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strand_common::{Address, ScheduledHandle, Scheduler};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::{Strategy, TransportConfig};
use crate::connection::{Connection, ConnectionFault, Connector};
use crate::error::{TransportError, TransportResult};

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured capacity.
    pub pool_size: usize,
    /// Checked-out connections.
    pub active: usize,
    /// Connections parked in the idle set.
    pub idle: usize,
    /// Acquirers waiting for a connection.
    pub waiters: usize,
}

type Delivery = oneshot::Sender<TransportResult<Arc<dyn Connection>>>;

/// Handle for abandoning a pending acquisition.
///
/// Cancelling removes a still-queued waiter; once the connection has been
/// delivered (or the acquisition already failed) cancellation is a no-op
/// because ownership has transferred.
#[derive(Clone)]
pub struct AcquireHandle {
    pool: Weak<Pool>,
    waiter_id: u64,
}

impl AcquireHandle {
    fn inert() -> Self {
        Self {
            pool: Weak::new(),
            waiter_id: 0,
        }
    }

    /// Abandon the acquisition if it is still queued.
    pub fn cancel(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.cancel_waiter(self.waiter_id);
        }
    }
}

struct Waiter {
    id: u64,
    tx: Delivery,
    /// True when the waiter was parked because the pool was at capacity;
    /// only these count against `pool_waiter_size`.
    at_capacity: bool,
}

struct IdleEntry {
    conn: Arc<dyn Connection>,
    idle_since: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Running,
    ShuttingDown,
}

struct PoolInner {
    idle: VecDeque<IdleEntry>,
    waiters: VecDeque<Waiter>,
    active: usize,
    creating: usize,
    /// Creation demand held back by the concurrency cap.
    queued_creations: usize,
    capacity_waiters: usize,
    state: PoolState,
    sweep: Option<ScheduledHandle>,
    shutdown_done: bool,
    shutdown_signals: Vec<oneshot::Sender<()>>,
}

/// A pool of reusable connections to one destination.
pub struct Pool {
    address: Address,
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<PoolInner>,
    next_waiter_id: AtomicU64,
    weak_self: Weak<Pool>,
}

impl Pool {
    /// Create a pool and pre-warm it toward `min_pool_size`.
    ///
    /// Must be called from within a runtime: creations and the idle sweep
    /// run as background tasks.
    pub fn new(
        address: Address,
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let pool = Arc::new_cyclic(|weak| Self {
            address,
            config,
            connector,
            scheduler,
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                active: 0,
                creating: 0,
                queued_creations: 0,
                capacity_waiters: 0,
                state: PoolState::Running,
                sweep: None,
                shutdown_done: false,
                shutdown_signals: Vec::new(),
            }),
            next_waiter_id: AtomicU64::new(1),
            weak_self: weak.clone(),
        });

        {
            let mut inner = pool.inner.lock();
            for _ in 0..pool.config.min_pool_size {
                pool.start_creation_locked(&mut inner);
            }
            inner.sweep = Some(pool.schedule_sweep());
        }
        pool
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Request a connection.
    ///
    /// The receiver yields the connection or a terminal pool error; the
    /// handle abandons a still-queued wait. An idle connection is delivered
    /// per the configured strategy; otherwise a creation is started while
    /// capacity remains, and at capacity the acquirer is parked FIFO unless
    /// the waiter queue is full.
    pub fn acquire(&self) -> (AcquireHandle, oneshot::Receiver<TransportResult<Arc<dyn Connection>>>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();

        if inner.state != PoolState::Running {
            let _ = tx.send(Err(TransportError::PoolShuttingDown {
                address: self.address.clone(),
            }));
            return (AcquireHandle::inert(), rx);
        }

        self.evict_expired_locked(&mut inner);

        if let Some(entry) = self.select_idle_locked(&mut inner) {
            trace!(address = %self.address, connection = %entry.conn.id(), "acquire served from idle");
            inner.active += 1;
            if let Err(rejected) = tx.send(Ok(entry.conn)) {
                // The receiver cannot be gone yet, but never leak the slot.
                inner.active -= 1;
                if let Ok(conn) = rejected {
                    inner.idle.push_back(IdleEntry {
                        conn,
                        idle_since: Instant::now(),
                    });
                }
            }
            return (AcquireHandle::inert(), rx);
        }

        if self.committed(&inner) < self.config.pool_size {
            let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            inner.waiters.push_back(Waiter {
                id,
                tx,
                at_capacity: false,
            });
            self.start_creation_locked(&mut inner);
            (self.handle_for(id), rx)
        } else if inner.capacity_waiters < self.config.pool_waiter_size {
            let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            inner.capacity_waiters += 1;
            inner.waiters.push_back(Waiter {
                id,
                tx,
                at_capacity: true,
            });
            trace!(address = %self.address, waiters = inner.waiters.len(), "acquire parked at capacity");
            (self.handle_for(id), rx)
        } else {
            let _ = tx.send(Err(TransportError::PoolExhausted {
                address: self.address.clone(),
                capacity: self.config.pool_waiter_size,
            }));
            (AcquireHandle::inert(), rx)
        }
    }

    /// Return a checked-out connection.
    ///
    /// Wakes the oldest waiter with it when one is parked; disposes it
    /// instead once the pool is shutting down.
    pub fn release(&self, conn: Arc<dyn Connection>) {
        let mut inner = self.inner.lock();
        if inner.state != PoolState::Running {
            inner.active -= 1;
            spawn_close(conn);
            self.check_shutdown_complete_locked(&mut inner);
            return;
        }

        let mut conn = conn;
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.at_capacity {
                inner.capacity_waiters -= 1;
            }
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => {
                    // Ownership transferred; the connection stays active.
                    trace!(address = %self.address, "released connection handed to waiter");
                    return;
                }
                Err(Ok(returned)) => conn = returned,
                Err(Err(_)) => return,
            }
        }

        inner.active -= 1;
        inner.idle.push_back(IdleEntry {
            conn,
            idle_since: Instant::now(),
        });
    }

    /// Destroy a checked-out connection unconditionally.
    ///
    /// While running, a replacement creation is started when acquirers are
    /// parked and capacity allows, or when the population has fallen below
    /// `min_pool_size`.
    pub fn dispose(&self, conn: Arc<dyn Connection>) {
        let mut inner = self.inner.lock();
        inner.active -= 1;
        debug!(address = %self.address, connection = %conn.id(), "disposing connection");
        spawn_close(conn);

        if inner.state != PoolState::Running {
            self.check_shutdown_complete_locked(&mut inner);
            return;
        }

        let committed = self.committed(&inner);
        if !inner.waiters.is_empty() && committed < self.config.pool_size {
            self.start_creation_locked(&mut inner);
        } else if committed < self.config.min_pool_size {
            self.start_creation_locked(&mut inner);
        }
    }

    /// Begin shutdown.
    ///
    /// New acquisitions are rejected with `PoolShuttingDown`, parked waiters
    /// fail immediately, idle connections are closed, and the returned
    /// receiver fires once every checked-out connection has been released or
    /// disposed. Safe to call repeatedly; every caller observes the single
    /// completion.
    pub fn shutdown(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();

        if inner.shutdown_done {
            let _ = tx.send(());
            return rx;
        }
        inner.shutdown_signals.push(tx);

        if inner.state == PoolState::Running {
            inner.state = PoolState::ShuttingDown;
            debug!(
                address = %self.address,
                active = inner.active,
                idle = inner.idle.len(),
                waiters = inner.waiters.len(),
                "pool shutting down"
            );

            if let Some(sweep) = inner.sweep.take() {
                sweep.cancel();
            }
            inner.queued_creations = 0;

            while let Some(waiter) = inner.waiters.pop_front() {
                let _ = waiter.tx.send(Err(TransportError::PoolShuttingDown {
                    address: self.address.clone(),
                }));
            }
            inner.capacity_waiters = 0;

            while let Some(entry) = inner.idle.pop_front() {
                spawn_close(entry.conn);
            }

            self.check_shutdown_complete_locked(&mut inner);
        }
        rx
    }

    /// Point-in-time counters. Never blocks beyond the pool's own mutex.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            pool_size: self.config.pool_size,
            active: inner.active,
            idle: inner.idle.len(),
            waiters: inner.waiters.len(),
        }
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn handle_for(&self, waiter_id: u64) -> AcquireHandle {
        AcquireHandle {
            pool: self.weak_self.clone(),
            waiter_id,
        }
    }

    /// Population that counts against `pool_size`: checked-out plus idle
    /// plus creations already running or queued.
    fn committed(&self, inner: &PoolInner) -> usize {
        inner.active + inner.idle.len() + inner.creating + inner.queued_creations
    }

    fn select_idle_locked(&self, inner: &mut PoolInner) -> Option<IdleEntry> {
        match self.config.strategy {
            Strategy::Lru => inner.idle.pop_front(),
            Strategy::Mru => inner.idle.pop_back(),
        }
    }

    /// Drop idle connections older than `idle_timeout`. Entries are ordered
    /// oldest-first, so scanning stops at the first fresh one.
    fn evict_expired_locked(&self, inner: &mut PoolInner) {
        let timeout = self.config.idle_timeout();
        while inner
            .idle
            .front()
            .map_or(false, |entry| entry.idle_since.elapsed() >= timeout)
        {
            if let Some(entry) = inner.idle.pop_front() {
                debug!(address = %self.address, connection = %entry.conn.id(), "evicting idle connection");
                spawn_close(entry.conn);
            }
        }
    }

    fn start_creation_locked(&self, inner: &mut PoolInner) {
        if inner.creating >= self.config.max_concurrent_connections {
            inner.queued_creations += 1;
            trace!(
                address = %self.address,
                queued = inner.queued_creations,
                "creation queued behind concurrency cap"
            );
            return;
        }
        inner.creating += 1;
        if let Some(pool) = self.weak_self.upgrade() {
            tokio::spawn(async move {
                pool.run_creation().await;
            });
        }
    }

    async fn run_creation(self: Arc<Self>) {
        debug!(address = %self.address, "opening connection");
        match self
            .connector
            .connect(&self.address, self.config.wire_limits())
            .await
        {
            Ok(conn) => self.creation_succeeded(conn),
            Err(fault) => self.creation_failed(fault),
        }
    }

    fn creation_succeeded(&self, conn: Arc<dyn Connection>) {
        let mut inner = self.inner.lock();
        inner.creating -= 1;
        if inner.queued_creations > 0 {
            inner.queued_creations -= 1;
            self.start_creation_locked(&mut inner);
        }

        if inner.state != PoolState::Running {
            spawn_close(conn);
            self.check_shutdown_complete_locked(&mut inner);
            return;
        }

        debug!(address = %self.address, connection = %conn.id(), "connection established");
        let mut conn = conn;
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.at_capacity {
                inner.capacity_waiters -= 1;
            }
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => {
                    inner.active += 1;
                    return;
                }
                Err(Ok(returned)) => conn = returned,
                Err(Err(_)) => return,
            }
        }
        inner.idle.push_back(IdleEntry {
            conn,
            idle_since: Instant::now(),
        });
    }

    fn creation_failed(&self, fault: ConnectionFault) {
        let mut inner = self.inner.lock();
        inner.creating -= 1;
        if inner.queued_creations > 0 {
            inner.queued_creations -= 1;
            self.start_creation_locked(&mut inner);
        }

        if inner.state != PoolState::Running {
            self.check_shutdown_complete_locked(&mut inner);
            return;
        }

        warn!(address = %self.address, error = %fault, "connection creation failed");

        // Surface the failure to the oldest acquirer still waiting.
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.at_capacity {
                inner.capacity_waiters -= 1;
            }
            let delivered = waiter.tx.send(Err(TransportError::PoolCreationFailed {
                address: self.address.clone(),
                reason: fault.to_string(),
            }));
            if delivered.is_ok() {
                break;
            }
        }
    }

    fn cancel_waiter(&self, waiter_id: u64) {
        let mut inner = self.inner.lock();
        if let Some(position) = inner.waiters.iter().position(|w| w.id == waiter_id) {
            if let Some(waiter) = inner.waiters.remove(position) {
                if waiter.at_capacity {
                    inner.capacity_waiters -= 1;
                }
                trace!(address = %self.address, "pending acquisition cancelled");
            }
        }
    }

    fn schedule_sweep(&self) -> ScheduledHandle {
        let pool = self.weak_self.clone();
        self.scheduler.schedule(
            self.config.idle_timeout(),
            Box::new(move || {
                if let Some(pool) = pool.upgrade() {
                    pool.sweep();
                }
            }),
        )
    }

    /// Periodic maintenance: evict stale idle connections and replenish the
    /// `min_pool_size` floor. Reschedules itself while the pool is running.
    fn sweep(&self) {
        let mut inner = self.inner.lock();
        if inner.state != PoolState::Running {
            return;
        }
        self.evict_expired_locked(&mut inner);
        while self.committed(&inner) < self.config.min_pool_size {
            self.start_creation_locked(&mut inner);
        }
        inner.sweep = Some(self.schedule_sweep());
    }

    fn check_shutdown_complete_locked(&self, inner: &mut PoolInner) {
        if inner.state == PoolState::Running || inner.shutdown_done {
            return;
        }
        if inner.active == 0 && inner.creating == 0 {
            inner.shutdown_done = true;
            debug!(address = %self.address, "pool shutdown complete");
            for tx in inner.shutdown_signals.drain(..) {
                let _ = tx.send(());
            }
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("address", &self.address)
            .field("stats", &stats)
            .finish()
    }
}

fn spawn_close(conn: Arc<dyn Connection>) {
    tokio::spawn(async move {
        conn.close().await;
    });
}
