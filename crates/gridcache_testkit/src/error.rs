//! Errors raised by test nodes.

use gridcache_core::{CacheError, StateTransferError};
use gridcache_rpc::ReplicationError;
use thiserror::Error;

/// Result type for [`TestNode`](crate::TestNode) operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// A failure while driving a test node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A local command failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Replicating a command failed.
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Starting the node failed while fetching state.
    #[error(transparent)]
    StateTransfer(#[from] StateTransferError),
}
