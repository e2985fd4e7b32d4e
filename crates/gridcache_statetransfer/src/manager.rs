//! Per-cache state transfer manager.

use gridcache_core::{
    Address, CacheCommand, CacheConfig, CacheResult, CacheStore, CommandExecutor, DataContainer,
    InvocationContext, StateTransferResult, TransactionLog, Transport,
};
use gridcache_rpc::RpcCoordinator;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The local collaborators whose state is transferred.
#[derive(Clone)]
pub struct CacheComponents {
    /// In-memory entries.
    pub container: Arc<dyn DataContainer>,
    /// Persistent store, if the cache has one.
    pub store: Option<Arc<dyn CacheStore>>,
    /// Log drained by a provider.
    pub transaction_log: Arc<TransactionLog>,
    /// Executes replayed and replicated commands.
    pub executor: Arc<dyn CommandExecutor>,
}

/// Drives state transfer for one cache, on either side of the transfer.
///
/// As a recipient, [`start`](Self::start) fetches state before the cache
/// accepts replicated commands. As a provider, the manager generates state
/// for whichever member asks.
pub struct StateTransferManager<T: Transport> {
    rpc: Arc<RpcCoordinator<T>>,
    components: CacheComponents,
    started: Mutex<bool>,
    started_changed: Condvar,
}

impl<T: Transport> StateTransferManager<T> {
    /// Creates a manager for the cache served by `rpc`.
    pub fn new(rpc: Arc<RpcCoordinator<T>>, components: CacheComponents) -> Self {
        Self {
            rpc,
            components,
            started: Mutex::new(false),
            started_changed: Condvar::new(),
        }
    }

    /// Returns the cache name.
    pub fn cache_name(&self) -> &str {
        self.rpc.cache_name()
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        self.rpc.config()
    }

    /// Returns the RPC coordinator.
    pub fn rpc(&self) -> &Arc<RpcCoordinator<T>> {
        &self.rpc
    }

    /// Returns the local collaborators.
    pub fn components(&self) -> &CacheComponents {
        &self.components
    }

    /// Starts the cache, fetching state first when the configuration asks
    /// for it.
    ///
    /// A failure leaves the cache stopped; there is no degraded start.
    pub fn start(&self) -> StateTransferResult<()> {
        if self.config().fetch_state_on_startup() {
            info!(cache = %self.cache_name(), "fetching state on startup");
            let start = Instant::now();
            self.rpc.retrieve_state(self.config().state_retrieval.timeout)?;
            info!(cache = %self.cache_name(), elapsed = ?start.elapsed(), "state fetched");
        }
        *self.started.lock() = true;
        self.started_changed.notify_all();
        debug!(cache = %self.cache_name(), "cache started");
        Ok(())
    }

    /// Returns true once [`start`](Self::start) has succeeded.
    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    /// Blocks until the cache has started, returning false on timeout.
    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut started = self.started.lock();
        while !*started {
            match deadline {
                Some(deadline) => {
                    if self
                        .started_changed
                        .wait_until(&mut started, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.started_changed.wait(&mut started),
            }
        }
        *started
    }

    /// Executes a command replicated by `origin`, unrolling batches.
    pub fn execute_remote(&self, origin: &Address, command: &CacheCommand) -> CacheResult<()> {
        match command {
            CacheCommand::Batch(commands) => commands
                .iter()
                .try_for_each(|command| self.execute_remote(origin, command)),
            command => self
                .components
                .executor
                .execute(&InvocationContext::remote(origin.clone()), command),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::Fixture;
    use gridcache_core::CacheConfig;
    use std::thread;
    use std::time::Duration;

    fn local_only() -> CacheConfig {
        CacheConfig::new()
            .fetch_in_memory_state(false)
            .fetch_persistent_state(false)
    }

    #[test]
    fn wait_until_started_times_out() {
        let fixture = Fixture::new("provider", local_only());
        assert!(!fixture.manager.wait_until_started(Duration::from_millis(20)));

        fixture.manager.start().unwrap();
        assert!(fixture.manager.is_started());
        assert!(fixture.manager.wait_until_started(Duration::ZERO));
    }

    #[test]
    fn unbounded_wait_ends_on_start() {
        let fixture = Fixture::new("provider", local_only());
        let manager = &fixture.manager;

        thread::scope(|scope| {
            let waiter = scope.spawn(|| manager.wait_until_started(Duration::MAX));
            thread::sleep(Duration::from_millis(20));
            manager.start().unwrap();
            assert!(waiter.join().unwrap());
        });
    }
}
