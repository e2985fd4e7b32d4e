//! # gridcache Core
//!
//! Core types and collaborator seams for the gridcache state-transfer
//! subsystem.
//!
//! This crate provides:
//! - Cluster identity (`Address`) and the commands exchanged between members
//! - The `TransactionLog` drained by a state provider
//! - The in-memory `DataContainer` and the persistent `CacheStore` seams
//! - The `Transport`, `DistributedSync` and `InboundHandler` seams
//! - Configuration and error types shared by every crate
//!
//! This crate performs no network I/O. Concrete transports live with
//! their users (see `gridcache_testkit` for an in-process cluster).
//!
//! ## Key Invariants
//!
//! - Transaction log entries accumulate only while the log is active
//! - Every processing lock acquired on a `DistributedSync` is released
//! - A single-member view never needs a remote call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod command;
mod config;
mod container;
mod error;
mod executor;
mod store;
mod sync;
mod transport;
mod txlog;

pub use address::Address;
pub use command::{CacheCommand, PrepareCommand, RpcCommand, TransactionId, WriteCommand};
pub use config::{CacheConfig, ReplicationQueueConfig, StateRetrievalConfig};
pub use container::{now_millis, DataContainer, InternalEntry, MemoryContainer};
pub use error::{
    CacheError, CacheResult, StateTransferError, StateTransferResult, SyncTimeout,
    TransportError, TransportResult,
};
pub use executor::{CommandExecutor, InvocationContext, InvocationFlags};
pub use store::{CacheStore, MemoryStore};
pub use sync::{DistributedSync, FlushSync};
pub use transport::{
    InboundHandler, RemoteFault, RemoteFaultKind, Response, ResponseFilter, ResponseMode,
    Transport,
};
pub use txlog::{LogEntry, TransactionLog};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
