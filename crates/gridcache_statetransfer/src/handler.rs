//! Inbound dispatch from a transport to the caches of one member.

use crate::manager::StateTransferManager;
use gridcache_core::{
    Address, CacheCommand, InboundHandler, RemoteFault, RemoteFaultKind, Response, RpcCommand,
    StateTransferError, StateTransferResult, Transport,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Routes inbound commands and state transfer requests to the
/// [`StateTransferManager`] registered for the target cache.
///
/// Managers are held weakly; a dropped cache behaves as unknown.
pub struct CacheInboundHandler<T: Transport> {
    local: Address,
    caches: RwLock<HashMap<String, Weak<StateTransferManager<T>>>>,
}

impl<T: Transport> CacheInboundHandler<T> {
    /// Creates a handler for the member at `local`.
    pub fn new(local: Address) -> Self {
        Self {
            local,
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a cache, replacing any cache of the same name.
    pub fn register(&self, manager: &Arc<StateTransferManager<T>>) {
        self.caches
            .write()
            .insert(manager.cache_name().to_string(), Arc::downgrade(manager));
    }

    /// Unregisters a cache.
    pub fn unregister(&self, cache_name: &str) {
        self.caches.write().remove(cache_name);
    }

    fn lookup(&self, cache_name: &str) -> Option<Arc<StateTransferManager<T>>> {
        self.caches.read().get(cache_name).and_then(Weak::upgrade)
    }

    fn fault(&self, kind: RemoteFaultKind, message: impl Into<String>) -> Response {
        Response::Fault(RemoteFault::new(self.local.clone(), kind, message))
    }
}

impl<T: Transport> InboundHandler for CacheInboundHandler<T> {
    fn handle(&self, command: &RpcCommand, origin: &Address) -> Response {
        let Some(manager) = self.lookup(&command.cache_name) else {
            return self.fault(
                RemoteFaultKind::Execution,
                format!("unknown cache: {}", command.cache_name),
            );
        };

        // Control commands arrive while the cache may still be starting.
        if let CacheCommand::StateTransferControl { enabled } = command.command {
            manager.handle_control(enabled);
            return Response::Success;
        }

        let timeout = manager.config().sync_replication_timeout;
        if !manager.wait_until_started(timeout) {
            debug!(cache = %command.cache_name, %origin, "cache not started in time");
            return self.fault(
                RemoteFaultKind::Timeout,
                format!("cache {} did not start within {timeout:?}", command.cache_name),
            );
        }

        match manager.execute_remote(origin, &command.command) {
            Ok(()) => Response::Success,
            Err(e) => {
                warn!(cache = %command.cache_name, %origin, command = command.command.name(), error = %e, "replicated command failed");
                self.fault(RemoteFaultKind::Execution, e.to_string())
            }
        }
    }

    fn generate_state(&self, cache_name: &str, out: &mut dyn Write) -> StateTransferResult<()> {
        self.lookup(cache_name)
            .ok_or_else(|| StateTransferError::UnknownCache(cache_name.to_string()))?
            .generate_state(out)
    }

    fn apply_state(
        &self,
        cache_name: &str,
        provider: &Address,
        input: &mut dyn Read,
    ) -> StateTransferResult<()> {
        self.lookup(cache_name)
            .ok_or_else(|| StateTransferError::UnknownCache(cache_name.to_string()))?
            .apply_state(provider, input)
    }
}
