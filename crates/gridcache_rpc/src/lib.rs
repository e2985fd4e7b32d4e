//! # gridcache RPC
//!
//! Remote invocation layer for gridcache caches.
//!
//! This crate provides:
//! - `RpcCoordinator`: synchronous and asynchronous invocation over a
//!   `Transport`, with fault translation into `ReplicationError`
//! - A write-behind `ReplicationQueue` for asynchronous broadcasts
//! - `RpcStats` counters (pure observers)
//! - The provider-discovery loop that fetches state on startup, with an
//!   interruptible, multiplicative backoff
//!
//! ## Key Invariants
//!
//! - A view with fewer than two members never reaches the transport
//! - Callers never see raw transport faults
//! - The backoff starts from the configured initial wait on every
//!   `retrieve_state` call
//! - The current state transfer source is cleared on every exit path

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coordinator;
mod error;
mod interrupt;
mod mock;
mod queue;
mod session;
mod stats;

pub use coordinator::RpcCoordinator;
pub use error::{ReplicationError, RpcResult};
pub use interrupt::{InterruptibleSleeper, Interrupted, Sleeper};
pub use mock::{MockTransport, RecordedInvocation};
pub use queue::ReplicationQueue;
pub use stats::{RpcStats, RpcStatsSnapshot};
