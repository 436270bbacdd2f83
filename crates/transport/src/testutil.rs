//! In-crate stubs for unit tests. Integration tests carry their own richer
//! mocks under `tests/common`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_common::{Address, ConnectionId};

use crate::connection::{Connection, ConnectionFault, Connector, WireLimits};
use crate::message::{Request, Response};

/// Connection that echoes the request payload immediately.
pub(crate) struct StubConnection {
    id: ConnectionId,
}

#[async_trait]
impl Connection for StubConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ConnectionFault> {
        Ok(Response::new(request.payload().clone()))
    }

    async fn close(&self) {}
}

/// Connector that always succeeds and counts connect attempts.
#[derive(Default)]
pub(crate) struct StubConnector {
    pub(crate) connects: AtomicUsize,
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(
        &self,
        _address: &Address,
        _limits: WireLimits,
    ) -> Result<Arc<dyn Connection>, ConnectionFault> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubConnection {
            id: ConnectionId::next(),
        }))
    }
}
