//! Test nodes: one cache on one member of a [`LocalCluster`].

use crate::cluster::{LocalCluster, LocalTransport};
use crate::container::HookedContainer;
use crate::error::NodeResult;
use crate::executor::MemoryExecutor;
use gridcache_core::{
    Address, CacheCommand, CacheConfig, CommandExecutor, DataContainer, InvocationContext,
    MemoryStore, PrepareCommand, StateRetrievalConfig, StateTransferResult, TransactionId,
    TransactionLog, WriteCommand,
};
use gridcache_rpc::RpcCoordinator;
use gridcache_statetransfer::{CacheComponents, CacheInboundHandler, StateTransferManager};
use std::sync::Arc;
use std::time::Duration;

/// Name of the cache every test node runs.
pub const TEST_CACHE: &str = "replicated";

/// A configuration with short timeouts and in-memory state transfer on.
pub fn test_config() -> CacheConfig {
    CacheConfig::new()
        .fetch_in_memory_state(true)
        .sync_replication_timeout(Duration::from_secs(5))
        .state_retrieval(
            StateRetrievalConfig::new()
                .timeout(Duration::from_secs(5))
                .initial_retry_wait(Duration::from_millis(10))
                .num_retries(3)
                .flush_timeout(Duration::from_secs(2))
                .distributed_sync_timeout(Duration::from_secs(5)),
        )
}

/// A member of a [`LocalCluster`] running [`TEST_CACHE`].
///
/// Writes go through a [`MemoryExecutor`] locally and are then replicated
/// synchronously to every other member.
pub struct TestNode {
    address: Address,
    transport: Arc<LocalTransport>,
    manager: Arc<StateTransferManager<LocalTransport>>,
    container: Arc<HookedContainer>,
    store: Arc<MemoryStore>,
    log: Arc<TransactionLog>,
    executor: Arc<MemoryExecutor>,
}

impl TestNode {
    /// Creates a node named `name` and adds it to the end of the view.
    ///
    /// The node does not accept replicated commands until
    /// [`start`](Self::start) succeeds.
    pub fn join(cluster: &Arc<LocalCluster>, name: &str, config: CacheConfig) -> Self {
        let address = Address::new(name);
        let transport = Arc::new(LocalTransport::new(
            Arc::clone(cluster),
            address.clone(),
            config.state_retrieval.distributed_sync_timeout,
        ));
        let container = Arc::new(HookedContainer::new());
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(TransactionLog::new());
        let executor = Arc::new(MemoryExecutor::new(
            container.clone(),
            Some(store.clone()),
            Arc::clone(&log),
        ));

        let components = CacheComponents {
            container: container.clone(),
            store: Some(store.clone()),
            transaction_log: Arc::clone(&log),
            executor: executor.clone(),
        };
        let rpc = Arc::new(RpcCoordinator::new(
            TEST_CACHE,
            Arc::clone(&transport),
            config,
        ));
        let manager = Arc::new(StateTransferManager::new(rpc, components));

        let handler = Arc::new(CacheInboundHandler::new(address.clone()));
        handler.register(&manager);
        cluster.join(address.clone(), handler);

        Self {
            address,
            transport,
            manager,
            container,
            store,
            log,
            executor,
        }
    }

    /// Starts the cache, fetching state if configured to.
    pub fn start(&self) -> StateTransferResult<()> {
        self.manager.start()
    }

    /// Removes this node from the view.
    pub fn leave(&self) {
        self.transport.cluster().leave(&self.address);
    }

    /// Returns this node's address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns this node's transport.
    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.transport
    }

    /// Returns the state transfer manager.
    pub fn manager(&self) -> &Arc<StateTransferManager<LocalTransport>> {
        &self.manager
    }

    /// Returns the RPC coordinator.
    pub fn rpc(&self) -> &Arc<RpcCoordinator<LocalTransport>> {
        self.manager.rpc()
    }

    /// Returns the in-memory container.
    pub fn container(&self) -> &Arc<HookedContainer> {
        &self.container
    }

    /// Returns the persistent store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Returns the transaction log.
    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    /// Returns the executor.
    pub fn executor(&self) -> &Arc<MemoryExecutor> {
        &self.executor
    }

    /// Executes `command` locally, then replicates it.
    pub fn execute(&self, command: CacheCommand, sync: bool) -> NodeResult<()> {
        self.executor.execute(&InvocationContext::local(), &command)?;
        self.rpc().broadcast_rpc_command(command, sync)?;
        Ok(())
    }

    /// Executes `command` locally without replicating it.
    pub fn execute_local(&self, command: &CacheCommand) -> NodeResult<()> {
        self.executor.execute(&InvocationContext::local(), command)?;
        Ok(())
    }

    /// Stores a value everywhere, synchronously.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> NodeResult<()> {
        self.execute(CacheCommand::Write(WriteCommand::put(key, value)), true)
    }

    /// Stores a value locally and replicates it asynchronously, through the
    /// replication queue when one is enabled.
    pub fn put_async(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> NodeResult<()> {
        self.execute(CacheCommand::Write(WriteCommand::put(key, value)), false)
    }

    /// Removes a key everywhere, synchronously.
    pub fn remove(&self, key: impl Into<Vec<u8>>) -> NodeResult<()> {
        self.execute(CacheCommand::Write(WriteCommand::remove(key)), true)
    }

    /// Prepares a transaction everywhere.
    pub fn prepare(&self, transaction: TransactionId, modifications: Vec<WriteCommand>) -> NodeResult<()> {
        self.execute(
            CacheCommand::Prepare(PrepareCommand::new(transaction, modifications)),
            true,
        )
    }

    /// Commits a prepared transaction everywhere.
    pub fn commit(&self, transaction: TransactionId) -> NodeResult<()> {
        self.execute(CacheCommand::Commit(transaction), true)
    }

    /// Rolls back a prepared transaction everywhere.
    pub fn rollback(&self, transaction: TransactionId) -> NodeResult<()> {
        self.execute(CacheCommand::Rollback(transaction), true)
    }

    /// Reads a value from the local container.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.container.get(key)
    }

    /// Returns the number of local entries.
    pub fn len(&self) -> usize {
        self.container.len()
    }

    /// Returns true if the local container is empty.
    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_replicate_to_started_members() {
        let cluster = LocalCluster::new();
        let a = TestNode::join(&cluster, "a", test_config());
        a.start().unwrap();
        let b = TestNode::join(&cluster, "b", test_config());
        b.start().unwrap();

        a.put("k", "v").unwrap();
        assert_eq!(b.get(b"k"), Some(b"v".to_vec()));

        b.remove("k").unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn transactions_replicate() {
        let cluster = LocalCluster::new();
        let a = TestNode::join(&cluster, "a", test_config());
        a.start().unwrap();
        let b = TestNode::join(&cluster, "b", test_config());
        b.start().unwrap();

        let committed = TransactionId::new();
        a.prepare(committed, vec![WriteCommand::put("c", "1")]).unwrap();
        assert!(b.get(b"c").is_none());
        assert_eq!(b.log().pending_prepares().len(), 1);
        a.commit(committed).unwrap();
        assert_eq!(b.get(b"c"), Some(b"1".to_vec()));

        let rolled_back = TransactionId::new();
        a.prepare(rolled_back, vec![WriteCommand::put("r", "1")]).unwrap();
        a.rollback(rolled_back).unwrap();
        assert!(b.get(b"r").is_none());
        assert!(b.log().pending_prepares().is_empty());
    }
}
