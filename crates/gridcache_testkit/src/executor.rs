//! A command executor over an in-memory container and store.

use gridcache_core::{
    CacheCommand, CacheError, CacheResult, CacheStore, CommandExecutor, DataContainer,
    InvocationContext, TransactionLog, WriteCommand,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Applies commands to a container and an optional store, recording their
/// outcomes in a [`TransactionLog`] the way a cache's interceptor chain
/// would.
pub struct MemoryExecutor {
    container: Arc<dyn DataContainer>,
    store: Option<Arc<dyn CacheStore>>,
    log: Arc<TransactionLog>,
    executed: Mutex<Vec<(InvocationContext, CacheCommand)>>,
}

impl MemoryExecutor {
    /// Creates an executor over the given collaborators.
    pub fn new(
        container: Arc<dyn DataContainer>,
        store: Option<Arc<dyn CacheStore>>,
        log: Arc<TransactionLog>,
    ) -> Self {
        Self {
            container,
            store,
            log,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Returns every command executed so far with its context.
    pub fn executed(&self) -> Vec<(InvocationContext, CacheCommand)> {
        self.executed.lock().clone()
    }

    fn apply(&self, write: &WriteCommand) -> CacheResult<()> {
        match write {
            WriteCommand::Put {
                key,
                value,
                lifespan_ms,
            } => {
                self.container.put_local(
                    key.clone(),
                    value.clone(),
                    lifespan_ms.map(Duration::from_millis),
                );
                if let Some(store) = &self.store {
                    store.store(key.clone(), value.clone())?;
                }
            }
            WriteCommand::Remove { key } => {
                self.container.remove(key);
                if let Some(store) = &self.store {
                    store.remove(key)?;
                }
            }
            WriteCommand::Clear => {
                self.container.clear();
                if let Some(store) = &self.store {
                    store.clear()?;
                }
            }
        }
        Ok(())
    }

    fn apply_all(&self, writes: &[WriteCommand]) -> CacheResult<()> {
        writes.iter().try_for_each(|write| self.apply(write))
    }
}

impl CommandExecutor for MemoryExecutor {
    fn execute(&self, ctx: &InvocationContext, command: &CacheCommand) -> CacheResult<()> {
        trace!(command = command.name(), origin = ?ctx.origin, "executing");
        self.executed.lock().push((ctx.clone(), command.clone()));

        match command {
            CacheCommand::Write(write) => {
                self.apply(write)?;
                self.log.log_no_tx_write(write.clone());
            }
            CacheCommand::Prepare(prepare) if prepare.one_phase_commit => {
                self.apply_all(&prepare.modifications)?;
                self.log
                    .log_one_phase_commit(&prepare.transaction, prepare.modifications.clone());
            }
            CacheCommand::Prepare(prepare) => self.log.log_prepare(prepare.clone()),
            CacheCommand::Commit(transaction) => {
                match self.log.pending_prepare(transaction) {
                    Some(prepare) => self.apply_all(&prepare.modifications)?,
                    None => debug!(%transaction, "commit for unknown transaction"),
                }
                self.log.log_commit(transaction);
            }
            CacheCommand::Rollback(transaction) => self.log.rollback(transaction),
            CacheCommand::Batch(commands) => {
                for command in commands {
                    self.execute(ctx, command)?;
                }
            }
            CacheCommand::StateTransferControl { .. } => {
                return Err(CacheError::execution(
                    "state transfer control is handled by the state transfer manager",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcache_core::{MemoryContainer, MemoryStore, PrepareCommand, TransactionId};

    fn executor() -> (MemoryExecutor, Arc<MemoryContainer>, Arc<MemoryStore>, Arc<TransactionLog>) {
        let container = Arc::new(MemoryContainer::new());
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(TransactionLog::new());
        let executor = MemoryExecutor::new(
            container.clone(),
            Some(store.clone()),
            Arc::clone(&log),
        );
        (executor, container, store, log)
    }

    #[test]
    fn writes_reach_container_store_and_active_log() {
        let (executor, container, store, log) = executor();
        assert!(log.activate());

        executor
            .execute(
                &InvocationContext::local(),
                &CacheCommand::Write(WriteCommand::put("k", "v")),
            )
            .unwrap();

        assert_eq!(container.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(store.load(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(log.size(), 1);
    }

    #[test]
    fn two_phase_commit_applies_on_commit() {
        let (executor, container, _store, log) = executor();
        let ctx = InvocationContext::local();
        let tx = TransactionId::new();
        let prepare = PrepareCommand::new(tx, vec![WriteCommand::put("k", "v")]);

        executor
            .execute(&ctx, &CacheCommand::Prepare(prepare.clone()))
            .unwrap();
        assert!(container.get(b"k").is_none());
        assert!(log.has_pending_prepare(&prepare));

        executor.execute(&ctx, &CacheCommand::Commit(tx)).unwrap();
        assert_eq!(container.get(b"k"), Some(b"v".to_vec()));
        assert!(log.pending_prepares().is_empty());
    }

    #[test]
    fn rollback_discards_the_prepare() {
        let (executor, container, _store, log) = executor();
        let ctx = InvocationContext::local();
        let tx = TransactionId::new();

        executor
            .execute(
                &ctx,
                &CacheCommand::Prepare(PrepareCommand::new(tx, vec![WriteCommand::put("k", "v")])),
            )
            .unwrap();
        executor.execute(&ctx, &CacheCommand::Rollback(tx)).unwrap();
        executor.execute(&ctx, &CacheCommand::Commit(tx)).unwrap();

        assert!(container.get(b"k").is_none());
        assert!(log.pending_prepares().is_empty());
    }

    #[test]
    fn one_phase_prepare_commits_immediately() {
        let (executor, container, _store, log) = executor();
        assert!(log.activate());
        let tx = TransactionId::new();

        executor
            .execute(
                &InvocationContext::local(),
                &CacheCommand::Prepare(PrepareCommand::one_phase(
                    tx,
                    vec![WriteCommand::put("a", "1"), WriteCommand::put("b", "2")],
                )),
            )
            .unwrap();

        assert_eq!(container.len(), 2);
        let entries = log.drain(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction, Some(tx));
    }

    #[test]
    fn control_commands_are_rejected() {
        let (executor, _container, _store, _log) = executor();
        assert!(executor
            .execute(
                &InvocationContext::local(),
                &CacheCommand::StateTransferControl { enabled: true },
            )
            .is_err());
        assert_eq!(executor.executed().len(), 1);
    }
}
