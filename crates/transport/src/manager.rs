//! Lazily-created pools keyed by destination address.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strand_common::{Address, Scheduler};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::connection::Connector;
use crate::error::{TransportError, TransportResult};
use crate::lifecycle::LifecycleSink;
use crate::pool::{Pool, PoolStats};

/// Owns the `Address → Pool` mapping. Pools are created at most once per
/// address; lookups on unrelated addresses never contend on a shared lock.
pub struct PoolManager {
    pools: DashMap<Address, Arc<Pool>>,
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    lifecycle: Arc<dyn LifecycleSink>,
    closed: AtomicBool,
}

impl PoolManager {
    pub fn new(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
        lifecycle: Arc<dyn LifecycleSink>,
    ) -> Self {
        Self {
            pools: DashMap::new(),
            config,
            connector,
            scheduler,
            lifecycle,
            closed: AtomicBool::new(false),
        }
    }

    /// The existing pool for `address`, or a new one created exactly once.
    ///
    /// Fails with `ManagerUnavailable` once shutdown has begun.
    pub fn pool_for(&self, address: &Address) -> TransportResult<Arc<Pool>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ManagerUnavailable);
        }

        let mut created = false;
        let pool = self
            .pools
            .entry(address.clone())
            .or_insert_with(|| {
                created = true;
                Pool::new(
                    address.clone(),
                    self.config.clone(),
                    Arc::clone(&self.connector),
                    Arc::clone(&self.scheduler),
                )
            })
            .clone();

        if created {
            debug!(address = %address, "created connection pool");
            self.lifecycle.on_pool_created(address);
        }

        // Shutdown raced the insert: fold the fresh pool into teardown.
        if self.closed.load(Ordering::Acquire) {
            let _ = pool.shutdown();
            return Err(TransportError::ManagerUnavailable);
        }
        Ok(pool)
    }

    /// Shut down every owned pool concurrently; resolves once all have
    /// reported. A pool that drops its completion signal is logged and
    /// treated as complete so one misbehaving pool cannot stall shutdown.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let pools: Vec<(Address, Arc<Pool>)> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        info!(pools = pools.len(), "shutting down connection pools");

        // Start every teardown before waiting on any of them.
        let mut completions = Vec::with_capacity(pools.len());
        for (address, pool) in pools {
            completions.push((address, pool.shutdown()));
        }

        for (address, completion) in completions {
            if completion.await.is_err() {
                warn!(address = %address, "pool dropped its shutdown signal, continuing");
            }
            self.lifecycle.on_pool_destroyed(&address);
        }
    }

    /// Point-in-time snapshot of per-address pool counters. Never blocks.
    pub fn stats(&self) -> HashMap<Address, PoolStats> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pools.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
