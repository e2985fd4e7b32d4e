//! An in-process cluster.
//!
//! Members share a [`LocalCluster`] and reach each other's
//! [`InboundHandler`] directly, each delivery on its own thread. State
//! travels through a [`pipe`](crate::pipe::pipe) between a provider thread
//! and the recipient.

use crate::pipe::pipe;
use gridcache_core::{
    Address, DistributedSync, FlushSync, InboundHandler, RemoteFault, RemoteFaultKind, Response,
    ResponseFilter, ResponseMode, RpcCommand, StateTransferError, StateTransferResult, Transport,
    TransportError, TransportResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Membership and handler registry shared by every [`LocalTransport`].
#[derive(Default)]
pub struct LocalCluster {
    view: RwLock<Vec<Address>>,
    handlers: RwLock<HashMap<Address, Arc<dyn InboundHandler>>>,
}

impl LocalCluster {
    /// Creates an empty cluster.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a member at the end of the view, or replaces its handler if it
    /// is already a member.
    pub fn join(&self, address: Address, handler: Arc<dyn InboundHandler>) {
        self.handlers.write().insert(address.clone(), handler);
        let mut view = self.view.write();
        if !view.contains(&address) {
            debug!(member = %address, "member joined");
            view.push(address);
        }
    }

    /// Removes a member. Deliveries to it are answered as suspected.
    pub fn leave(&self, address: &Address) {
        self.view.write().retain(|member| member != address);
        self.handlers.write().remove(address);
        debug!(member = %address, "member left");
    }

    /// Returns the current view.
    pub fn members(&self) -> Vec<Address> {
        self.view.read().clone()
    }

    fn handler(&self, address: &Address) -> Option<Arc<dyn InboundHandler>> {
        self.handlers.read().get(address).cloned()
    }
}

/// Holds a shared processing lock for one invocation.
struct SharedLock<'a> {
    sync: &'a FlushSync,
}

impl<'a> SharedLock<'a> {
    fn acquire(sync: &'a FlushSync, timeout: Duration) -> TransportResult<Self> {
        sync.acquire_processing_lock(false, timeout)?;
        Ok(Self { sync })
    }
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        self.sync.release_processing_lock();
    }
}

/// Marks a cache as receiving state until dropped.
struct TransferInProgress<'a> {
    caches: &'a Mutex<HashSet<String>>,
    cache_name: String,
}

impl<'a> TransferInProgress<'a> {
    fn enter(caches: &'a Mutex<HashSet<String>>, cache_name: &str) -> StateTransferResult<Self> {
        if !caches.lock().insert(cache_name.to_string()) {
            return Err(StateTransferError::InProgress(cache_name.to_string()));
        }
        Ok(Self {
            caches,
            cache_name: cache_name.to_string(),
        })
    }
}

impl Drop for TransferInProgress<'_> {
    fn drop(&mut self) {
        self.caches.lock().remove(&self.cache_name);
    }
}

/// One member's [`Transport`] into a [`LocalCluster`].
pub struct LocalTransport {
    cluster: Arc<LocalCluster>,
    address: Address,
    sync: FlushSync,
    sync_timeout: Duration,
    supports_state_transfer: AtomicBool,
    unreachable: Mutex<HashSet<Address>>,
    state_requests: Mutex<Vec<Address>>,
    sent: Mutex<Vec<RpcCommand>>,
    transfers_in_progress: Mutex<HashSet<String>>,
}

impl LocalTransport {
    /// Creates the transport of the member at `address`.
    ///
    /// `sync_timeout` bounds how long a regular invocation waits for the
    /// distributed sync.
    pub fn new(cluster: Arc<LocalCluster>, address: Address, sync_timeout: Duration) -> Self {
        Self {
            cluster,
            address,
            sync: FlushSync::new(),
            sync_timeout,
            supports_state_transfer: AtomicBool::new(true),
            unreachable: Mutex::new(HashSet::new()),
            state_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            transfers_in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the cluster this transport belongs to.
    pub fn cluster(&self) -> &Arc<LocalCluster> {
        &self.cluster
    }

    /// Sets whether state transfer is supported.
    pub fn set_supports_state_transfer(&self, supported: bool) {
        self.supports_state_transfer
            .store(supported, Ordering::SeqCst);
    }

    /// Makes state requests to `provider` fail as if it could not be
    /// reached.
    pub fn set_unreachable(&self, provider: Address, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(provider);
        } else {
            set.remove(&provider);
        }
    }

    /// Returns every provider state was requested from, in request order.
    pub fn state_requests(&self) -> Vec<Address> {
        self.state_requests.lock().clone()
    }

    /// Returns every command this member sent, in send order.
    pub fn sent(&self) -> Vec<RpcCommand> {
        self.sent.lock().clone()
    }

    fn collect_responses(
        &self,
        targets: &[Address],
        mut responses: Vec<Option<Response>>,
        received: mpsc::Receiver<(usize, Response)>,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<&dyn ResponseFilter>,
    ) -> Vec<Response> {
        let deadline = Instant::now().checked_add(timeout);
        let mut satisfied = false;
        while responses.iter().any(Option::is_none) {
            let next = match deadline {
                Some(deadline) => received
                    .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    .ok(),
                None => received.recv().ok(),
            };
            let Some((index, response)) = next else {
                break;
            };
            if let Some(filter) = filter {
                filter.is_acceptable(&response, &targets[index]);
                satisfied = !filter.needs_more_responses();
            }
            responses[index] = Some(response);
            if satisfied && mode == ResponseMode::WaitForValidResponse {
                break;
            }
        }

        targets
            .iter()
            .zip(responses)
            .filter_map(|(target, response)| match response {
                Some(response) => Some(response),
                None if satisfied => None,
                None => Some(Response::Fault(RemoteFault::new(
                    target.clone(),
                    RemoteFaultKind::Timeout,
                    format!("no response within {timeout:?}"),
                ))),
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn members(&self) -> Vec<Address> {
        self.cluster.members()
    }

    fn address(&self) -> Address {
        self.address.clone()
    }

    fn invoke_remotely(
        &self,
        recipients: Option<&[Address]>,
        command: &RpcCommand,
        mode: ResponseMode,
        timeout: Duration,
        _use_priority_queue: bool,
        filter: Option<&dyn ResponseFilter>,
        _support_replay: bool,
    ) -> TransportResult<Vec<Response>> {
        self.sync.block_until_released(self.sync_timeout)?;
        let _lock = SharedLock::acquire(&self.sync, self.sync_timeout)?;

        let targets: Vec<Address> = match recipients {
            Some(recipients) => recipients.to_vec(),
            None => self
                .cluster
                .members()
                .into_iter()
                .filter(|member| *member != self.address)
                .collect(),
        };
        trace!(
            from = %self.address,
            command = command.command.name(),
            recipients = targets.len(),
            "delivering"
        );
        self.sent.lock().push(command.clone());

        let (tx, rx) = mpsc::channel();
        let mut responses = vec![None; targets.len()];
        for (index, target) in targets.iter().enumerate() {
            let Some(handler) = self.cluster.handler(target) else {
                responses[index] = Some(Response::Fault(RemoteFault::new(
                    target.clone(),
                    RemoteFaultKind::Suspected,
                    "member is not in the cluster",
                )));
                continue;
            };
            let tx = tx.clone();
            let command = command.clone();
            let origin = self.address.clone();
            thread::Builder::new()
                .name(format!("gridcache-deliver-{target}"))
                .spawn(move || {
                    let response = handler.handle(&command, &origin);
                    let _ = tx.send((index, response));
                })
                .map_err(|e| TransportError::Other(e.to_string()))?;
        }
        drop(tx);

        if !mode.is_synchronous() {
            return Ok(Vec::new());
        }
        Ok(self.collect_responses(&targets, responses, rx, mode, timeout, filter))
    }

    fn supports_state_transfer(&self) -> bool {
        self.supports_state_transfer.load(Ordering::SeqCst)
    }

    fn retrieve_state(
        &self,
        cache_name: &str,
        provider: &Address,
        timeout: Duration,
    ) -> StateTransferResult<bool> {
        self.state_requests.lock().push(provider.clone());
        if self.unreachable.lock().contains(provider) {
            debug!(%provider, "provider unreachable");
            return Ok(false);
        }
        let Some(remote) = self.cluster.handler(provider) else {
            debug!(%provider, "provider is not in the cluster");
            return Ok(false);
        };
        let local = self
            .cluster
            .handler(&self.address)
            .ok_or_else(|| StateTransferError::UnknownCache(cache_name.to_string()))?;
        let _in_progress = TransferInProgress::enter(&self.transfers_in_progress, cache_name)?;

        let (mut writer, mut reader) = pipe(Some(timeout));
        let cache = cache_name.to_string();
        let generator = thread::Builder::new()
            .name(format!("gridcache-state-{provider}"))
            .spawn(move || remote.generate_state(&cache, &mut writer))?;

        let applied = local.apply_state(cache_name, provider, &mut reader);
        drop(reader);
        let generated = generator
            .join()
            .map_err(|_| StateTransferError::stream("state provider panicked"))?;

        applied?;
        if let Err(e) = generated {
            warn!(%provider, error = %e, "provider failed after state was applied");
            return Err(e);
        }
        Ok(true)
    }

    fn distributed_sync(&self) -> &dyn DistributedSync {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcache_core::{CacheCommand, WriteCommand};
    use std::io::{Read, Write};

    struct Echo {
        address: Address,
        delay: Duration,
    }

    impl InboundHandler for Echo {
        fn handle(&self, _command: &RpcCommand, _origin: &Address) -> Response {
            thread::sleep(self.delay);
            Response::Value(self.address.as_str().as_bytes().to_vec())
        }

        fn generate_state(&self, _cache: &str, out: &mut dyn Write) -> StateTransferResult<()> {
            out.write_all(self.address.as_str().as_bytes())?;
            Ok(())
        }

        fn apply_state(
            &self,
            _cache: &str,
            _provider: &Address,
            input: &mut dyn Read,
        ) -> StateTransferResult<()> {
            let mut data = String::new();
            input.read_to_string(&mut data)?;
            if data.is_empty() {
                return Err(StateTransferError::stream("empty state"));
            }
            Ok(())
        }
    }

    fn echo(name: &str, delay: Duration) -> Arc<dyn InboundHandler> {
        Arc::new(Echo {
            address: Address::new(name),
            delay,
        })
    }

    fn cluster_of(names: &[&str]) -> Arc<LocalCluster> {
        let cluster = LocalCluster::new();
        for name in names {
            cluster.join(Address::new(*name), echo(name, Duration::ZERO));
        }
        cluster
    }

    fn command() -> RpcCommand {
        RpcCommand::new("c", CacheCommand::Write(WriteCommand::put("k", "v")))
    }

    #[test]
    fn broadcast_reaches_every_other_member_in_view_order() {
        let cluster = cluster_of(&["a", "b", "c"]);
        let transport = LocalTransport::new(cluster, Address::new("a"), Duration::from_secs(1));

        let responses = transport
            .invoke_remotely(
                None,
                &command(),
                ResponseMode::Synchronous,
                Duration::from_secs(1),
                false,
                None,
                false,
            )
            .unwrap();

        assert_eq!(
            responses,
            vec![Response::Value(b"b".to_vec()), Response::Value(b"c".to_vec())]
        );
    }

    #[test]
    fn missing_member_is_suspected_and_slow_member_times_out() {
        let cluster = cluster_of(&["a"]);
        cluster.join(Address::new("slow"), echo("slow", Duration::from_millis(500)));
        let transport =
            LocalTransport::new(cluster, Address::new("a"), Duration::from_secs(1));
        let targets = vec![Address::new("gone"), Address::new("slow")];

        let responses = transport
            .invoke_remotely(
                Some(targets.as_slice()),
                &command(),
                ResponseMode::Synchronous,
                Duration::from_millis(20),
                false,
                None,
                false,
            )
            .unwrap();

        assert_eq!(
            responses[0].as_fault().map(|f| f.kind),
            Some(RemoteFaultKind::Suspected)
        );
        assert_eq!(
            responses[1].as_fault().map(|f| f.kind),
            Some(RemoteFaultKind::Timeout)
        );
    }

    #[test]
    fn raised_sync_blocks_invocations() {
        let cluster = cluster_of(&["a", "b"]);
        let transport =
            LocalTransport::new(cluster, Address::new("a"), Duration::from_millis(20));
        transport.distributed_sync().acquire_sync();

        let err = transport
            .invoke_remotely(
                None,
                &command(),
                ResponseMode::Synchronous,
                Duration::from_secs(1),
                false,
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Sync(_)));
    }

    #[test]
    fn state_moves_through_the_pipe() {
        let cluster = cluster_of(&["a", "b"]);
        let transport =
            LocalTransport::new(cluster, Address::new("b"), Duration::from_secs(1));

        assert!(transport
            .retrieve_state("c", &Address::new("a"), Duration::from_secs(1))
            .unwrap());
        assert!(!transport
            .retrieve_state("c", &Address::new("gone"), Duration::from_secs(1))
            .unwrap());

        transport.set_unreachable(Address::new("a"), true);
        assert!(!transport
            .retrieve_state("c", &Address::new("a"), Duration::from_secs(1))
            .unwrap());

        assert_eq!(
            transport.state_requests(),
            vec![Address::new("a"), Address::new("gone"), Address::new("a")]
        );
    }

    #[test]
    fn second_transfer_for_the_same_cache_is_refused() {
        let caches = Mutex::new(HashSet::new());
        let first = TransferInProgress::enter(&caches, "c").unwrap();
        assert!(matches!(
            TransferInProgress::enter(&caches, "c"),
            Err(StateTransferError::InProgress(name)) if name == "c"
        ));
        assert!(TransferInProgress::enter(&caches, "other").is_ok());

        drop(first);
        assert!(TransferInProgress::enter(&caches, "c").is_ok());
    }
}
