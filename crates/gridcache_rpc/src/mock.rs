//! A scripted transport for testing.

use gridcache_core::{
    Address, DistributedSync, FlushSync, Response, ResponseFilter, ResponseMode, RpcCommand,
    StateTransferResult, Transport, TransportError, TransportResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

type StateScript = Box<dyn FnMut(&Address) -> StateTransferResult<bool> + Send>;

/// One call recorded by [`MockTransport::invoke_remotely`].
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    /// Explicit recipients, `None` for a broadcast.
    pub recipients: Option<Vec<Address>>,
    /// The command sent.
    pub command: RpcCommand,
    /// The response mode requested.
    pub mode: ResponseMode,
    /// Whether the priority queue was requested.
    pub use_priority_queue: bool,
}

/// A transport whose membership, responses and state retrieval outcomes are
/// set by the test.
pub struct MockTransport {
    address: Address,
    members: Mutex<Vec<Address>>,
    supports_state_transfer: AtomicBool,
    responses: Mutex<Option<Vec<Response>>>,
    failure: Mutex<Option<String>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
    state_script: Mutex<StateScript>,
    state_attempts: Mutex<Vec<Address>>,
    sync: FlushSync,
}

impl MockTransport {
    /// Creates a transport for `address` whose view is `members`.
    ///
    /// Every state retrieval fails until [`set_state_script`] says otherwise.
    ///
    /// [`set_state_script`]: MockTransport::set_state_script
    pub fn new(address: Address, members: Vec<Address>) -> Self {
        Self {
            address,
            members: Mutex::new(members),
            supports_state_transfer: AtomicBool::new(true),
            responses: Mutex::new(None),
            failure: Mutex::new(None),
            invocations: Mutex::new(Vec::new()),
            state_script: Mutex::new(Box::new(|_| Ok(false))),
            state_attempts: Mutex::new(Vec::new()),
            sync: FlushSync::new(),
        }
    }

    /// Replaces the view.
    pub fn set_members(&self, members: Vec<Address>) {
        *self.members.lock() = members;
    }

    /// Sets whether state transfer is supported.
    pub fn set_supports_state_transfer(&self, supported: bool) {
        self.supports_state_transfer
            .store(supported, Ordering::SeqCst);
    }

    /// Sets the responses returned by every invocation. By default each
    /// recipient answers [`Response::Success`].
    pub fn set_responses(&self, responses: Vec<Response>) {
        *self.responses.lock() = Some(responses);
    }

    /// Makes every invocation fail with a transport error.
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.lock() = message;
    }

    /// Sets the outcome of each `retrieve_state` call.
    pub fn set_state_script(
        &self,
        script: impl FnMut(&Address) -> StateTransferResult<bool> + Send + 'static,
    ) {
        *self.state_script.lock() = Box::new(script);
    }

    /// Returns every invocation so far.
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().clone()
    }

    /// Returns every provider asked for state, in order.
    pub fn state_attempts(&self) -> Vec<Address> {
        self.state_attempts.lock().clone()
    }
}

impl Transport for MockTransport {
    fn members(&self) -> Vec<Address> {
        self.members.lock().clone()
    }

    fn address(&self) -> Address {
        self.address.clone()
    }

    fn invoke_remotely(
        &self,
        recipients: Option<&[Address]>,
        command: &RpcCommand,
        mode: ResponseMode,
        _timeout: Duration,
        use_priority_queue: bool,
        _filter: Option<&dyn ResponseFilter>,
        _support_replay: bool,
    ) -> TransportResult<Vec<Response>> {
        self.invocations.lock().push(RecordedInvocation {
            recipients: recipients.map(<[Address]>::to_vec),
            command: command.clone(),
            mode,
            use_priority_queue,
        });

        if let Some(message) = self.failure.lock().clone() {
            return Err(TransportError::Other(message));
        }
        if let Some(responses) = self.responses.lock().clone() {
            return Ok(responses);
        }
        let count = match recipients {
            Some(recipients) => recipients.len(),
            None => self
                .members()
                .iter()
                .filter(|m| **m != self.address)
                .count(),
        };
        Ok(vec![Response::Success; count])
    }

    fn supports_state_transfer(&self) -> bool {
        self.supports_state_transfer.load(Ordering::SeqCst)
    }

    fn retrieve_state(
        &self,
        _cache_name: &str,
        provider: &Address,
        _timeout: Duration,
    ) -> StateTransferResult<bool> {
        self.state_attempts.lock().push(provider.clone());
        let mut script = self.state_script.lock();
        (&mut **script)(provider)
    }

    fn distributed_sync(&self) -> &dyn DistributedSync {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcache_core::CacheCommand;

    #[test]
    fn default_responses_cover_other_members() {
        let transport = MockTransport::new(
            Address::new("a"),
            vec![Address::new("a"), Address::new("b"), Address::new("c")],
        );
        let command = RpcCommand::new("c", CacheCommand::Commit(Default::default()));
        let responses = transport
            .invoke_remotely(
                None,
                &command,
                ResponseMode::Synchronous,
                Duration::from_secs(1),
                false,
                None,
                false,
            )
            .unwrap();
        assert_eq!(responses, vec![Response::Success, Response::Success]);
        assert_eq!(transport.invocations().len(), 1);
    }

    #[test]
    fn failure_is_a_transport_error() {
        let transport = MockTransport::new(Address::new("a"), vec![Address::new("a")]);
        transport.set_failure(Some("down".into()));
        let command = RpcCommand::new("c", CacheCommand::Rollback(Default::default()));
        let result = transport.invoke_remotely(
            None,
            &command,
            ResponseMode::Asynchronous,
            Duration::from_secs(1),
            false,
            None,
            false,
        );
        assert!(matches!(result, Err(TransportError::Other(_))));
    }
}
