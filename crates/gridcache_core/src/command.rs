//! Commands replicated between cluster members.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Cluster-wide transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random transaction ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a transaction ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// A single modification of cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteCommand {
    /// Stores a value, optionally expiring after `lifespan_ms`.
    Put {
        /// Entry key.
        key: Vec<u8>,
        /// Entry value.
        value: Vec<u8>,
        /// Lifespan in milliseconds, `None` for immortal entries.
        lifespan_ms: Option<u64>,
    },
    /// Removes a key.
    Remove {
        /// Entry key.
        key: Vec<u8>,
    },
    /// Removes every entry.
    Clear,
}

impl WriteCommand {
    /// Creates an immortal put.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
            lifespan_ms: None,
        }
    }

    /// Creates a put that expires after `lifespan`.
    pub fn put_with_lifespan(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        lifespan: Duration,
    ) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
            lifespan_ms: Some(lifespan.as_millis() as u64),
        }
    }

    /// Creates a remove.
    pub fn remove(key: impl Into<Vec<u8>>) -> Self {
        Self::Remove { key: key.into() }
    }

    /// Returns the key this command touches, if any.
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            WriteCommand::Put { key, .. } | WriteCommand::Remove { key } => Some(key),
            WriteCommand::Clear => None,
        }
    }
}

/// First phase of a two-phase commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareCommand {
    /// The transaction being prepared.
    pub transaction: TransactionId,
    /// Modifications the transaction will apply on commit.
    pub modifications: Vec<WriteCommand>,
    /// Whether prepare and commit happen in one round.
    pub one_phase_commit: bool,
}

impl PrepareCommand {
    /// Creates a two-phase prepare.
    pub fn new(transaction: TransactionId, modifications: Vec<WriteCommand>) -> Self {
        Self {
            transaction,
            modifications,
            one_phase_commit: false,
        }
    }

    /// Creates a one-phase prepare, which commits as it prepares.
    pub fn one_phase(transaction: TransactionId, modifications: Vec<WriteCommand>) -> Self {
        Self {
            transaction,
            modifications,
            one_phase_commit: true,
        }
    }
}

/// A command addressed to a named cache on another member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheCommand {
    /// Non-transactional write.
    Write(WriteCommand),
    /// Transaction prepare.
    Prepare(PrepareCommand),
    /// Transaction commit.
    Commit(TransactionId),
    /// Transaction rollback.
    Rollback(TransactionId),
    /// Asks a state provider to block (`true`) or unblock (`false`) further
    /// transaction log draining.
    StateTransferControl {
        /// Block when true, unblock when false.
        enabled: bool,
    },
    /// Commands batched by the replication queue.
    Batch(Vec<CacheCommand>),
}

impl CacheCommand {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            CacheCommand::Write(_) => "write",
            CacheCommand::Prepare(_) => "prepare",
            CacheCommand::Commit(_) => "commit",
            CacheCommand::Rollback(_) => "rollback",
            CacheCommand::StateTransferControl { .. } => "state-transfer-control",
            CacheCommand::Batch(_) => "batch",
        }
    }
}

/// A [`CacheCommand`] together with the cache it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCommand {
    /// Name of the target cache.
    pub cache_name: String,
    /// The command.
    pub command: CacheCommand,
}

impl RpcCommand {
    /// Creates a new RPC command.
    pub fn new(cache_name: impl Into<String>, command: CacheCommand) -> Self {
        Self {
            cache_name: cache_name.into(),
            command,
        }
    }
}
