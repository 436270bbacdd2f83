//! Side-table tagging checked-out connections with their owning pool.

use dashmap::DashMap;
use std::sync::Arc;
use strand_common::ConnectionId;

use crate::pool::Pool;

/// Maps connection identity to the pool it was checked out from, so terminal
/// cleanup can return or dispose a connection without the request tracking
/// pool identity itself.
///
/// Entries are removed with take-once semantics: the first `untag` gets the
/// pool, every later one gets `None`. Double-return of a connection is
/// therefore structurally impossible.
#[derive(Default)]
pub(crate) struct CheckoutLedger {
    entries: DashMap<ConnectionId, Arc<Pool>>,
}

impl CheckoutLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `connection` as checked out from `pool`.
    pub(crate) fn tag(&self, connection: ConnectionId, pool: Arc<Pool>) {
        self.entries.insert(connection, pool);
    }

    /// Take the owning pool for `connection`, if still tagged.
    pub(crate) fn untag(&self, connection: ConnectionId) -> Option<Arc<Pool>> {
        self.entries.remove(&connection).map(|(_, pool)| pool)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::testutil::StubConnector;
    use strand_common::{Address, TokioScheduler};

    #[tokio::test]
    async fn untag_is_take_once() {
        let config = TransportConfig {
            min_pool_size: 0,
            ..Default::default()
        };
        let pool = Pool::new(
            Address::new("peer:1"),
            config,
            Arc::new(StubConnector::default()),
            Arc::new(TokioScheduler),
        );

        let ledger = CheckoutLedger::new();
        let id = ConnectionId::next();
        ledger.tag(id, Arc::clone(&pool));
        assert_eq!(ledger.len(), 1);

        assert!(ledger.untag(id).is_some());
        assert!(ledger.untag(id).is_none());
        assert_eq!(ledger.len(), 0);
    }
}
