//! # gridcache Testkit
//!
//! Test utilities for gridcache.
//!
//! This crate provides:
//! - An in-process cluster whose transport delivers commands on threads
//!   and streams state through an in-memory pipe
//! - Test nodes running one replicated cache each
//! - An executor and a container with a snapshot hook for driving
//!   concurrent writes into a transfer
//! - Property-based test generators using proptest
//! - An end-to-end join simulation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridcache_testkit::prelude::*;
//!
//! let cluster = LocalCluster::new();
//! let a = TestNode::join(&cluster, "a", test_config());
//! a.start()?;
//! a.put("k", "v")?;
//!
//! let b = TestNode::join(&cluster, "b", test_config());
//! b.start()?;
//! assert_eq!(b.get(b"k"), Some(b"v".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod container;
pub mod error;
pub mod executor;
pub mod generators;
pub mod node;
pub mod pipe;
pub mod scenario;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cluster::*;
    pub use crate::container::*;
    pub use crate::error::*;
    pub use crate::executor::*;
    pub use crate::generators::*;
    pub use crate::node::*;
    pub use crate::scenario::{NodeReport, Scenario, SimulationReport};
}

pub use cluster::{LocalCluster, LocalTransport};
pub use container::HookedContainer;
pub use error::{NodeError, NodeResult};
pub use executor::MemoryExecutor;
pub use node::{test_config, TestNode, TEST_CACHE};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use scenario::{NodeReport, Scenario, SimulationReport};
