//! Transport abstraction for cluster communication.

use crate::address::Address;
use crate::command::RpcCommand;
use crate::error::{StateTransferResult, TransportResult};
use crate::sync::DistributedSync;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;
use thiserror::Error;

/// How a caller waits for the responses of a remote invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Wait for every recipient.
    Synchronous,
    /// Do not wait.
    Asynchronous,
    /// Wait until the response filter is satisfied.
    WaitForValidResponse,
}

impl ResponseMode {
    /// Maps a sync flag to a mode.
    pub fn from_sync(sync: bool) -> Self {
        if sync {
            Self::Synchronous
        } else {
            Self::Asynchronous
        }
    }

    /// Returns true if the caller waits for responses.
    pub fn is_synchronous(&self) -> bool {
        !matches!(self, Self::Asynchronous)
    }
}

/// Why a recipient could not produce a regular response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFaultKind {
    /// The recipient is suspected to have left.
    Suspected,
    /// The recipient did not answer in time.
    Timeout,
    /// The recipient failed to execute the command.
    Execution,
}

/// A fault captured inside a response rather than raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} fault from {sender}: {message}")]
pub struct RemoteFault {
    /// The recipient that produced the fault.
    pub sender: Address,
    /// Fault category.
    pub kind: RemoteFaultKind,
    /// Description of the fault.
    pub message: String,
}

impl RemoteFault {
    /// Creates a new fault.
    pub fn new(sender: Address, kind: RemoteFaultKind, message: impl Into<String>) -> Self {
        Self {
            sender,
            kind,
            message: message.into(),
        }
    }
}

/// One recipient's answer to a remote invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The command executed.
    Success,
    /// The command executed and returned a value.
    Value(Vec<u8>),
    /// The command failed on the recipient.
    Fault(RemoteFault),
}

impl Response {
    /// Returns true if this response carries a fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Response::Fault(_))
    }

    /// Returns the carried fault, if any.
    pub fn as_fault(&self) -> Option<&RemoteFault> {
        match self {
            Response::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Decides which responses count towards a
/// [`ResponseMode::WaitForValidResponse`] invocation.
pub trait ResponseFilter: Send + Sync {
    /// Returns true if `response` from `sender` is acceptable.
    fn is_acceptable(&self, response: &Response, sender: &Address) -> bool;

    /// Returns true while the caller must keep waiting.
    fn needs_more_responses(&self) -> bool;
}

/// Cluster transport: membership, delivery and the distributed sync.
pub trait Transport: Send + Sync {
    /// Returns the current view, in view order. Never cached by callers.
    fn members(&self) -> Vec<Address>;

    /// Returns this member's address.
    fn address(&self) -> Address;

    /// Delivers `command` to `recipients`, or to every other member when
    /// `None`, and collects one response per recipient.
    ///
    /// Responses may carry a [`RemoteFault`] instead of the transport
    /// raising an error.
    #[allow(clippy::too_many_arguments)]
    fn invoke_remotely(
        &self,
        recipients: Option<&[Address]>,
        command: &RpcCommand,
        mode: ResponseMode,
        timeout: Duration,
        use_priority_queue: bool,
        filter: Option<&dyn ResponseFilter>,
        support_replay: bool,
    ) -> TransportResult<Vec<Response>>;

    /// Returns true if this transport can transfer state at all.
    fn supports_state_transfer(&self) -> bool;

    /// Asks `provider` to generate state for `cache_name` and applies it
    /// locally through the registered [`InboundHandler`].
    ///
    /// Returns false if the provider could not be reached.
    fn retrieve_state(
        &self,
        cache_name: &str,
        provider: &Address,
        timeout: Duration,
    ) -> StateTransferResult<bool>;

    /// Returns the distributed sync shared by every cache on this member.
    fn distributed_sync(&self) -> &dyn DistributedSync;
}

/// The entry points a transport dispatches inbound traffic to.
pub trait InboundHandler: Send + Sync {
    /// Handles a replicated command sent by `origin`.
    fn handle(&self, command: &RpcCommand, origin: &Address) -> Response;

    /// Writes the state of `cache_name` for a recipient.
    fn generate_state(&self, cache_name: &str, out: &mut dyn Write) -> StateTransferResult<()>;

    /// Applies state of `cache_name` generated by `provider`.
    fn apply_state(
        &self,
        cache_name: &str,
        provider: &Address,
        input: &mut dyn Read,
    ) -> StateTransferResult<()>;
}
