//! The RPC coordinator.

use crate::error::{ReplicationError, RpcResult};
use crate::interrupt::{InterruptibleSleeper, Sleeper};
use crate::queue::ReplicationQueue;
use crate::session::StateTransferSession;
use crate::stats::RpcStats;
use gridcache_core::{
    Address, CacheCommand, CacheConfig, Response, ResponseFilter, ResponseMode, RpcCommand,
    StateTransferError, StateTransferResult, Transport,
};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Wraps a [`Transport`] for one cache.
///
/// The coordinator adds fault translation, statistics, write-behind
/// queuing of asynchronous broadcasts, and the provider-discovery loop used
/// to fetch state on startup.
pub struct RpcCoordinator<T: Transport> {
    cache_name: String,
    transport: Arc<T>,
    config: CacheConfig,
    queue: Option<Arc<ReplicationQueue>>,
    stats: RpcStats,
    state_transfer_source: RwLock<Option<Address>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: Transport> RpcCoordinator<T> {
    /// Creates a coordinator for `cache_name`.
    pub fn new(cache_name: impl Into<String>, transport: Arc<T>, config: CacheConfig) -> Self {
        let queue = config
            .replication_queue
            .enabled
            .then(|| Arc::new(ReplicationQueue::new(&config.replication_queue)));
        let stats = RpcStats::new(config.statistics_enabled);
        Self {
            cache_name: cache_name.into(),
            transport,
            config,
            queue,
            stats,
            state_transfer_source: RwLock::new(None),
            sleeper: Arc::new(InterruptibleSleeper::new()),
        }
    }

    /// Replaces the sleeper used between provider-discovery passes.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the cache this coordinator serves.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Returns the wrapped transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the replication statistics.
    pub fn stats(&self) -> &RpcStats {
        &self.stats
    }

    /// Returns the replication queue, if one is configured.
    pub fn replication_queue(&self) -> Option<&ReplicationQueue> {
        self.queue.as_deref()
    }

    /// Returns the provider being asked for state right now, if any.
    ///
    /// For diagnostics only.
    pub fn current_state_transfer_source(&self) -> Option<Address> {
        self.state_transfer_source.read().clone()
    }

    /// Invokes `command` on `recipients`, or on every other member when
    /// `None`.
    ///
    /// Returns no responses without sending anything when this member is
    /// alone in the view. Every failure is reported as a
    /// [`ReplicationError`].
    pub fn invoke_remotely(
        &self,
        recipients: Option<&[Address]>,
        command: &CacheCommand,
        mode: ResponseMode,
        timeout: Duration,
        use_priority_queue: bool,
        filter: Option<&dyn ResponseFilter>,
    ) -> RpcResult<Vec<Response>> {
        let members = self.transport.members();
        if members.len() < 2 {
            trace!(cache = %self.cache_name, "single member view, not replicating");
            return Ok(Vec::new());
        }

        let rpc = RpcCommand::new(self.cache_name.as_str(), command.clone());
        let start = Instant::now();
        match self.transport.invoke_remotely(
            recipients,
            &rpc,
            mode,
            timeout,
            use_priority_queue,
            filter,
            false,
        ) {
            Ok(responses) => {
                self.stats.record_success(start.elapsed());
                trace!(
                    cache = %self.cache_name,
                    command = command.name(),
                    responses = responses.len(),
                    "remote invocation complete"
                );
                Ok(responses)
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(cache = %self.cache_name, command = command.name(), error = %e, "remote invocation failed");
                Err(ReplicationError::with_source(
                    format!("failed to invoke {} on the cluster", command.name()),
                    e,
                ))
            }
        }
    }

    /// Invokes `command` with the configured replication timeout.
    pub fn invoke_remotely_sync(
        &self,
        recipients: Option<&[Address]>,
        command: &CacheCommand,
        sync: bool,
    ) -> RpcResult<Vec<Response>> {
        self.invoke_remotely(
            recipients,
            command,
            ResponseMode::from_sync(sync),
            self.config.sync_replication_timeout,
            false,
            None,
        )
    }

    /// Broadcasts `command` to every other member.
    pub fn broadcast_rpc_command(&self, command: CacheCommand, sync: bool) -> RpcResult<()> {
        self.broadcast_rpc_command_with_priority(command, sync, false)
    }

    /// Broadcasts `command`, optionally on the priority queue.
    ///
    /// Asynchronous non-priority broadcasts go to the replication queue when
    /// it is enabled. Synchronous broadcasts fail with the first fault any
    /// recipient reports.
    pub fn broadcast_rpc_command_with_priority(
        &self,
        command: CacheCommand,
        sync: bool,
        use_priority_queue: bool,
    ) -> RpcResult<()> {
        if !sync && !use_priority_queue {
            if let Some(queue) = self.queue.as_ref().filter(|q| q.is_enabled()) {
                queue.add(command);
                return Ok(());
            }
        }

        let responses = self.invoke_remotely(
            None,
            &command,
            ResponseMode::from_sync(sync),
            self.config.sync_replication_timeout,
            use_priority_queue,
            None,
        )?;

        if sync {
            if let Some(fault) = responses.iter().find_map(Response::as_fault) {
                return Err(ReplicationError::remote(fault.clone()));
            }
        }
        Ok(())
    }

    /// Sends every queued command as one asynchronous batch.
    ///
    /// Returns the number of commands sent.
    pub fn flush_replication_queue(&self) -> RpcResult<usize> {
        let Some(queue) = self.queue.as_ref() else {
            return Ok(0);
        };
        let commands = queue.drain();
        if commands.is_empty() {
            return Ok(0);
        }
        let count = commands.len();
        debug!(cache = %self.cache_name, count, "flushing replication queue");
        self.invoke_remotely(
            None,
            &CacheCommand::Batch(commands),
            ResponseMode::Asynchronous,
            self.config.sync_replication_timeout,
            false,
            None,
        )?;
        Ok(count)
    }

    /// Fetches state for this cache from another member.
    ///
    /// Members are tried in view order, for up to the configured number of
    /// passes, sleeping between passes for a backoff that grows by the
    /// configured factor. A view with fewer than two members succeeds at
    /// once.
    pub fn retrieve_state(&self, timeout: Duration) -> StateTransferResult<()> {
        if !self.transport.supports_state_transfer() {
            return Err(StateTransferError::Unsupported(format!(
                "transport for cache {} cannot transfer state",
                self.cache_name
            )));
        }

        let retrieval = &self.config.state_retrieval;
        let local = self.transport.address();
        let mut session = StateTransferSession::new(
            &self.state_transfer_source,
            retrieval.initial_retry_wait,
            retrieval.num_retries,
        );

        while session.begin_pass() {
            let members = self.transport.members();
            if members.len() < 2 {
                debug!(cache = %self.cache_name, "no other member to fetch state from");
                return Ok(());
            }

            for provider in members.iter().filter(|m| **m != local) {
                let _candidate = session.candidate(provider);
                debug!(cache = %self.cache_name, %provider, pass = session.passes_started(), "trying state provider");
                match self.transport.retrieve_state(&self.cache_name, provider, timeout) {
                    Ok(true) => {
                        info!(cache = %self.cache_name, %provider, "state retrieved");
                        return Ok(());
                    }
                    Ok(false) => {
                        debug!(cache = %self.cache_name, %provider, "provider did not deliver state");
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(cache = %self.cache_name, %provider, error = %e, "state retrieval from provider failed");
                    }
                }
            }

            if session.is_last_pass() {
                break;
            }
            let wait = session.wait();
            debug!(cache = %self.cache_name, ?wait, "no provider delivered state, backing off");
            if self.sleeper.sleep(wait).is_err() {
                warn!(cache = %self.cache_name, "state retrieval interrupted");
                return Err(StateTransferError::Interrupted);
            }
            session.grow_wait(retrieval.retry_wait_increase_factor);
        }

        Err(StateTransferError::Exhausted {
            passes: session.passes_started(),
        })
    }
}

impl<T: Transport + 'static> RpcCoordinator<T> {
    /// Broadcasts `command` synchronously on another thread and hands the
    /// outcome to `on_done`.
    pub fn broadcast_rpc_command_in_future<F>(
        self: &Arc<Self>,
        command: CacheCommand,
        use_priority_queue: bool,
        on_done: F,
    ) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce(RpcResult<()>) + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        thread::Builder::new()
            .name(format!("{}-broadcast", self.cache_name))
            .spawn(move || {
                let result =
                    coordinator.broadcast_rpc_command_with_priority(command, true, use_priority_queue);
                on_done(result);
            })
    }

    /// Starts the background thread that flushes the replication queue.
    ///
    /// Returns `None` when no queue is configured. The thread exits once
    /// the coordinator is dropped.
    pub fn start_replication_flusher(self: &Arc<Self>) -> std::io::Result<Option<JoinHandle<()>>> {
        let Some(queue) = self.queue.clone() else {
            return Ok(None);
        };
        let coordinator: Weak<Self> = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name(format!("{}-replication-queue", self.cache_name))
            .spawn(move || {
                while queue.wait_for_flush() {
                    let Some(coordinator) = coordinator.upgrade() else {
                        break;
                    };
                    if let Err(e) = coordinator.flush_replication_queue() {
                        warn!(error = %e, "replication queue flush failed");
                    }
                }
            })?;
        Ok(Some(handle))
    }
}

impl<T: Transport> Drop for RpcCoordinator<T> {
    fn drop(&mut self) {
        if let Some(queue) = &self.queue {
            queue.shutdown();
        }
    }
}
