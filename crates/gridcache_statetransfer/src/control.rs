//! The flush hand-shake between a recipient and its provider.
//!
//! The recipient asks the provider to block with a
//! [`CacheCommand::StateTransferControl`] round trip, then raises its own
//! sync. Unblocking reverses both steps in the opposite order.

use crate::manager::StateTransferManager;
use gridcache_core::{
    Address, CacheCommand, ResponseMode, StateTransferError, StateTransferResult, Transport,
};
use tracing::{debug, warn};

impl<T: Transport> StateTransferManager<T> {
    /// Serves a control command sent by a recipient: raises the local sync
    /// when `enabled`, lowers it otherwise.
    pub fn handle_control(&self, enabled: bool) {
        let sync = self.rpc().transport().distributed_sync();
        if enabled {
            debug!(cache = %self.cache_name(), "blocking for state transfer flush");
            sync.acquire_sync();
        } else {
            debug!(cache = %self.cache_name(), "unblocking after state transfer flush");
            sync.release_sync();
        }
    }

    fn send_control(&self, provider: &Address, enabled: bool) -> StateTransferResult<()> {
        let responses = self
            .rpc()
            .invoke_remotely(
                Some(std::slice::from_ref(provider)),
                &CacheCommand::StateTransferControl { enabled },
                ResponseMode::Synchronous,
                self.config().state_retrieval.timeout,
                true,
                None,
            )
            .map_err(|e| StateTransferError::control(e.to_string()))?;
        if let Some(fault) = responses.iter().find_map(|r| r.as_fault()) {
            return Err(StateTransferError::control(fault.to_string()));
        }
        Ok(())
    }
}

/// The recipient's half of one flush hand-shake.
///
/// Dropping a session that was never unblocked explicitly unblocks it, so
/// the provider is released on every exit path.
pub(crate) struct FlushSession<'a, T: Transport> {
    manager: &'a StateTransferManager<T>,
    provider: Address,
    needs_unblock: bool,
}

impl<'a, T: Transport> FlushSession<'a, T> {
    /// Asks `provider` to block, then raises the local sync.
    pub(crate) fn begin(
        manager: &'a StateTransferManager<T>,
        provider: &Address,
    ) -> StateTransferResult<Self> {
        let session = Self {
            manager,
            provider: provider.clone(),
            needs_unblock: true,
        };
        debug!(cache = %manager.cache_name(), %provider, "requesting flush");
        manager.send_control(provider, true)?;
        manager.rpc().transport().distributed_sync().acquire_sync();
        Ok(session)
    }

    /// Lowers the local sync, then asks the provider to unblock.
    pub(crate) fn unblock(mut self) -> StateTransferResult<()> {
        self.release()
    }

    fn release(&mut self) -> StateTransferResult<()> {
        if !self.needs_unblock {
            return Ok(());
        }
        self.needs_unblock = false;
        self.manager
            .rpc()
            .transport()
            .distributed_sync()
            .release_sync();
        debug!(cache = %self.manager.cache_name(), provider = %self.provider, "releasing flush");
        self.manager.send_control(&self.provider, false)
    }
}

impl<T: Transport> Drop for FlushSession<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                cache = %self.manager.cache_name(),
                provider = %self.provider,
                error = %e,
                "failed to unblock state provider"
            );
        }
    }
}
