//! Error types for gridcache core.

use crate::address::Address;
use crate::transport::RemoteFault;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache-local operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for state transfer operations.
pub type StateTransferResult<T> = Result<T, StateTransferError>;

/// Errors raised by the local collaborators of a cache: the container,
/// the persistent store and the command executor.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The persistent store failed.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// A command could not be executed against local state.
    #[error("command execution failed: {message}")]
    Execution {
        /// Description of the execution failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

/// A bounded wait on a [`crate::DistributedSync`] expired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} timed out after {timeout:?}")]
pub struct SyncTimeout {
    /// The operation that was waiting.
    pub operation: &'static str,
    /// How long it waited.
    pub timeout: Duration,
}

impl SyncTimeout {
    /// Creates a new timeout error.
    pub fn new(operation: &'static str, timeout: Duration) -> Self {
        Self { operation, timeout }
    }
}

/// Errors raised by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The member is suspected to have left the cluster.
    #[error("suspected member: {0}")]
    Suspected(Address),

    /// No response arrived in time.
    #[error("replication timeout after {0:?}")]
    Timeout(Duration),

    /// The transport is not connected to a cluster.
    #[error("transport is not connected")]
    NotConnected,

    /// A recipient answered with an application-level fault.
    #[error("remote fault: {0}")]
    Remote(#[from] RemoteFault),

    /// Waiting on the distributed sync timed out.
    #[error(transparent)]
    Sync(#[from] SyncTimeout),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// The dedicated state transfer fault.
#[derive(Debug, Error)]
pub enum StateTransferError {
    /// The transport cannot transfer state at all. Never retried.
    #[error("transport does not, or is not configured to, support state transfer: {0}")]
    Unsupported(String),

    /// Every provider failed on every pass.
    #[error("unable to fetch state on startup after {passes} passes")]
    Exhausted {
        /// Number of passes attempted.
        passes: u32,
    },

    /// The backoff sleep between passes was interrupted.
    #[error("state retrieval interrupted")]
    Interrupted,

    /// The provider answered that it cannot provide state.
    #[error("provider {provider} cannot provide state")]
    ProviderCannotProvide {
        /// The provider that refused.
        provider: Address,
    },

    /// The stream did not contain what the protocol requires.
    #[error("protocol violation: expected {expected}, found {found}")]
    Protocol {
        /// What the reader expected.
        expected: &'static str,
        /// What the reader found instead.
        found: String,
    },

    /// A transfer for this cache is already running on this member.
    #[error("a state transfer is already in progress for cache {0}")]
    InProgress(String),

    /// No cache with this name is registered on the member.
    #[error("unknown cache: {0}")]
    UnknownCache(String),

    /// The state stream could not be encoded or decoded.
    #[error("state stream error: {message}")]
    Stream {
        /// Description of the stream failure.
        message: String,
    },

    /// The flush control round trip failed.
    #[error("flush control failed: {message}")]
    Control {
        /// Description of the control failure.
        message: String,
    },

    /// I/O error on the state stream.
    #[error("I/O error during state transfer: {0}")]
    Io(#[from] io::Error),

    /// A local collaborator failed while generating or applying state.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A bounded wait on the distributed sync expired.
    #[error(transparent)]
    Sync(#[from] SyncTimeout),
}

impl StateTransferError {
    /// Creates a protocol violation error.
    pub fn protocol(expected: &'static str, found: impl Into<String>) -> Self {
        Self::Protocol {
            expected,
            found: found.into(),
        }
    }

    /// Creates a stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Creates a flush control error.
    pub fn control(message: impl Into<String>) -> Self {
        Self::Control {
            message: message.into(),
        }
    }

    /// Returns true if this fault rules out any further attempt, whatever
    /// the provider.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StateTransferError::Unsupported(_)
                | StateTransferError::Exhausted { .. }
                | StateTransferError::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(StateTransferError::Unsupported("no flush".into()).is_fatal());
        assert!(StateTransferError::Exhausted { passes: 3 }.is_fatal());
        assert!(StateTransferError::Interrupted.is_fatal());
        assert!(!StateTransferError::protocol("delimiter", "Entry").is_fatal());
        assert!(!StateTransferError::ProviderCannotProvide {
            provider: Address::new("a"),
        }
        .is_fatal());
    }

    #[test]
    fn error_display() {
        let err = StateTransferError::protocol("delimiter", "Log");
        assert_eq!(
            err.to_string(),
            "protocol violation: expected delimiter, found Log"
        );

        let err = SyncTimeout::new("block until acquired", Duration::from_millis(250));
        assert!(err.to_string().contains("block until acquired"));
        assert!(err.to_string().contains("250"));
    }

    #[test]
    fn sync_timeout_converts() {
        let err: StateTransferError = SyncTimeout::new("processing lock", Duration::ZERO).into();
        assert!(matches!(err, StateTransferError::Sync(_)));

        let err: TransportError = SyncTimeout::new("processing lock", Duration::ZERO).into();
        assert!(matches!(err, TransportError::Sync(_)));
    }
}
