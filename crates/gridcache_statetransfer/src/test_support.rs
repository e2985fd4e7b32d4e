//! Fixtures shared by the unit tests of this crate.

use crate::manager::{CacheComponents, StateTransferManager};
use gridcache_core::{
    Address, CacheCommand, CacheConfig, CacheError, CacheResult, CommandExecutor, DataContainer,
    InvocationContext, MemoryContainer, MemoryStore, PrepareCommand, TransactionLog, WriteCommand,
};
use gridcache_rpc::{MockTransport, RpcCoordinator};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const CACHE: &str = "orders";

/// Applies writes to a container and records everything else.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    pub(crate) container: Arc<MemoryContainer>,
    pub(crate) prepares: Mutex<Vec<PrepareCommand>>,
    pub(crate) contexts: Mutex<Vec<InvocationContext>>,
    pub(crate) fail_on_key: Mutex<Option<Vec<u8>>>,
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, ctx: &InvocationContext, command: &CacheCommand) -> CacheResult<()> {
        self.contexts.lock().push(ctx.clone());
        match command {
            CacheCommand::Write(write) => {
                if write.key().is_some() && write.key() == self.fail_on_key.lock().as_deref() {
                    return Err(CacheError::execution("injected failure"));
                }
                match write {
                    WriteCommand::Put {
                        key,
                        value,
                        lifespan_ms,
                    } => self.container.put_local(
                        key.clone(),
                        value.clone(),
                        lifespan_ms.map(Duration::from_millis),
                    ),
                    WriteCommand::Remove { key } => {
                        self.container.remove(key);
                    }
                    WriteCommand::Clear => self.container.clear(),
                }
            }
            CacheCommand::Prepare(prepare) => self.prepares.lock().push(prepare.clone()),
            _ => {}
        }
        Ok(())
    }
}

pub(crate) struct Fixture {
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) manager: StateTransferManager<MockTransport>,
    pub(crate) executor: Arc<RecordingExecutor>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) log: Arc<TransactionLog>,
}

impl Fixture {
    pub(crate) fn new(local: &str, config: CacheConfig) -> Self {
        let transport = Arc::new(MockTransport::new(
            Address::new(local),
            vec![Address::new("provider"), Address::new("recipient")],
        ));
        let executor = Arc::new(RecordingExecutor::default());
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(TransactionLog::new());
        let container: Arc<dyn DataContainer> = executor.container.clone();
        let components = CacheComponents {
            container,
            store: Some(store.clone()),
            transaction_log: Arc::clone(&log),
            executor: executor.clone(),
        };
        let rpc = Arc::new(RpcCoordinator::new(CACHE, Arc::clone(&transport), config));
        Self {
            transport,
            manager: StateTransferManager::new(rpc, components),
            executor,
            store,
            log,
        }
    }
}

pub(crate) fn full_config() -> CacheConfig {
    CacheConfig::new()
        .fetch_in_memory_state(true)
        .fetch_persistent_state(true)
        .state_retrieval(
            gridcache_core::StateRetrievalConfig::new()
                .timeout(Duration::from_secs(2))
                .flush_timeout(Duration::from_millis(200)),
        )
}
