//! Shared mock transport for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_common::{Address, ConnectionId};
use strand_transport::{
    Connection, ConnectionFault, Connector, Request, Response, TransportConfig, WireLimits,
};

/// Per-dispatch behavior of a mock connection.
#[derive(Clone)]
pub enum Behavior {
    /// Echo the request payload back after `delay`.
    Echo { delay: Duration },
    /// Never respond.
    Stall,
    /// Fail the write immediately.
    Fault(String),
    /// Respond with `size` zero bytes after `delay`.
    Respond { delay: Duration, size: usize },
}

pub struct MockConnection {
    id: ConnectionId,
    behavior: Behavior,
    closed: AtomicBool,
    dispatches: AtomicUsize,
}

impl MockConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ConnectionFault> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Echo { delay } => {
                tokio::time::sleep(*delay).await;
                Ok(Response::new(request.payload().clone()))
            }
            Behavior::Stall => std::future::pending().await,
            Behavior::Fault(reason) => Err(ConnectionFault::new(reason.clone())),
            Behavior::Respond { delay, size } => {
                tokio::time::sleep(*delay).await;
                Ok(Response::new(vec![0u8; *size]))
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector producing [`MockConnection`]s and recording every connect.
pub struct MockConnector {
    behavior: Mutex<Behavior>,
    connect_delay: Mutex<Duration>,
    fail_connects: AtomicBool,
    connects: AtomicUsize,
    connects_in_flight: AtomicUsize,
    max_concurrent_connects: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            connect_delay: Mutex::new(Duration::ZERO),
            fail_connects: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            connects_in_flight: AtomicUsize::new(0),
            max_concurrent_connects: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// Behavior applied to connections opened after this call.
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn set_fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Largest number of connects ever in flight at once.
    pub fn max_concurrent_connects(&self) -> usize {
        self.max_concurrent_connects.load(Ordering::SeqCst)
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        Arc::clone(&self.connections.lock()[index])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _address: &Address,
        _limits: WireLimits,
    ) -> Result<Arc<dyn Connection>, ConnectionFault> {
        let in_flight = self.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_connects
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(ConnectionFault::new("connect refused"));
        }

        let conn = Arc::new(MockConnection {
            id: ConnectionId::next(),
            behavior: self.behavior.lock().clone(),
            closed: AtomicBool::new(false),
            dispatches: AtomicUsize::new(0),
        });
        self.connections.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}

/// Small, fast config for tests; individual tests override what they probe.
pub fn test_config() -> TransportConfig {
    TransportConfig {
        pool_size: 4,
        min_pool_size: 0,
        pool_waiter_size: 8,
        idle_timeout_ms: 60_000,
        max_concurrent_connections: 4,
        request_timeout_ms: 1_000,
        shutdown_timeout_ms: 1_000,
        max_response_size: 1024 * 1024,
        max_header_size: 8 * 1024,
        max_chunk_size: 8 * 1024,
        ..Default::default()
    }
}
