//! # gridcache State Transfer
//!
//! Hands a consistent copy of a cache's state from an existing member (the
//! provider) to a joining one (the recipient) while writes continue on the
//! provider.
//!
//! ## Protocol
//!
//! 1. The recipient's `StateTransferManager::start` asks the RPC
//!    coordinator to retrieve state, trying providers in view order
//! 2. The provider activates its transaction log, then streams its
//!    in-memory entries, its persistent store and the log drained so far
//! 3. The provider takes its exclusive processing lock and waits for the
//!    recipient's flush request
//! 4. The recipient replays the pre-flush log, asks the provider to block,
//!    and raises its own sync
//! 5. The provider drains the rest of the log and lists the prepared but
//!    unresolved transactions
//! 6. The recipient replays both, skipping prepares the log already
//!    committed, then unblocks the provider
//!
//! ## Key Invariants
//!
//! - Sections arrive in a fixed order, each terminated by a delimiter
//! - Every block request is matched by exactly one unblock, on every path
//! - The provider's log is deactivated and its processing lock released on
//!   every path
//! - No prepare is applied twice

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod control;
mod frame;
mod handler;
mod manager;
mod provider;
mod recipient;

#[cfg(test)]
mod test_support;

pub use frame::{assert_delimiter, StateItem, StateReader, StateWriter};
pub use handler::CacheInboundHandler;
pub use manager::{CacheComponents, StateTransferManager};
