//! Error types for the RPC coordinator.

use gridcache_core::{RemoteFault, TransportError};
use std::error::Error as StdError;
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, ReplicationError>;

/// The generic replication fault.
///
/// Every transport failure and every fault captured inside a response
/// surfaces to callers as this type, with the original kept as its source.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReplicationError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ReplicationError {
    /// Creates an error without a cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps a fault captured inside a response.
    pub fn remote(fault: RemoteFault) -> Self {
        Self::with_source(format!("remote invocation failed on {}", fault.sender), fault)
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the captured remote fault, if this error wraps one.
    pub fn remote_fault(&self) -> Option<&RemoteFault> {
        self.source.as_ref()?.downcast_ref::<RemoteFault>()
    }

    /// Returns the transport failure, if this error wraps one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        self.source.as_ref()?.downcast_ref::<TransportError>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcache_core::{Address, RemoteFaultKind};
    use std::time::Duration;

    #[test]
    fn wraps_remote_fault() {
        let fault = RemoteFault::new(Address::new("b"), RemoteFaultKind::Execution, "boom");
        let err = ReplicationError::remote(fault.clone());
        assert_eq!(err.remote_fault(), Some(&fault));
        assert!(err.transport_error().is_none());
        assert!(err.to_string().contains('b'));
        assert!(err.source().is_some());
    }

    #[test]
    fn wraps_transport_error() {
        let err = ReplicationError::with_source(
            "broadcast failed",
            TransportError::Timeout(Duration::from_secs(1)),
        );
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::Timeout(_))
        ));
        assert_eq!(err.message(), "broadcast failed");
    }

    #[test]
    fn plain_error_has_no_source() {
        let err = ReplicationError::new("nothing to do");
        assert!(err.source().is_none());
        assert!(err.remote_fault().is_none());
    }
}
