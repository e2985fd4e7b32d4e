//! End-to-end simulation of members joining a running cluster.

use crate::cluster::LocalCluster;
use crate::error::NodeResult;
use crate::node::{test_config, TestNode};
use gridcache_core::{
    CacheCommand, CacheStore, CommandExecutor, DataContainer, InvocationContext, PrepareCommand,
    TransactionId, WriteCommand,
};
use gridcache_rpc::RpcStatsSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// What a simulation seeds and how many members join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Members in total, the seeding member included.
    pub nodes: usize,
    /// Entries written on the seeding member before anyone joins.
    pub entries: usize,
    /// Whether persistent state is transferred as well.
    pub persistent: bool,
    /// Transactions committed on the seeding member while the first
    /// joiner receives state.
    pub commits: usize,
    /// Transactions left prepared but unresolved.
    pub prepares: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            nodes: 3,
            entries: 100,
            persistent: false,
            commits: 10,
            prepares: 5,
        }
    }
}

/// One member's state after a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Member name.
    pub address: String,
    /// In-memory entries.
    pub entries: usize,
    /// Entries in the persistent store.
    pub stored: usize,
    /// Prepared transactions awaiting their outcome.
    pub pending_prepares: usize,
    /// Members state was requested from, in request order.
    pub state_requests: Vec<String>,
    /// RPC statistics of the member's cache.
    pub stats: RpcStatsSnapshot,
}

/// The outcome of [`run`].
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// One report per member, in join order.
    pub nodes: Vec<NodeReport>,
    /// True if every member ended with the seeding member's entries and
    /// pending prepares.
    pub consistent: bool,
    /// Wall time of the whole simulation, in milliseconds.
    pub elapsed_ms: u64,
}

/// Seeds one member, then has the others join and fetch state one by one.
pub fn run(scenario: &Scenario) -> NodeResult<SimulationReport> {
    let started = Instant::now();
    let cluster = LocalCluster::new();
    let config = test_config().fetch_persistent_state(scenario.persistent);

    let seed = TestNode::join(&cluster, "node-0", config.clone());
    seed.start()?;
    for i in 0..scenario.entries {
        seed.put(format!("key-{i}"), format!("value-{i}"))?;
    }
    for i in 0..scenario.prepares {
        seed.prepare(
            TransactionId::new(),
            vec![WriteCommand::put(format!("pending-{i}"), "prepared")],
        )?;
    }
    info!(
        entries = scenario.entries,
        prepares = scenario.prepares,
        "seeded first member"
    );

    if scenario.commits > 0 && scenario.nodes > 1 {
        let executor = Arc::clone(seed.executor());
        let commits = scenario.commits;
        seed.container().on_next_snapshot(move || {
            let ctx = InvocationContext::local();
            for i in 0..commits {
                let prepare = PrepareCommand::one_phase(
                    TransactionId::new(),
                    vec![WriteCommand::put(format!("committed-{i}"), "during-transfer")],
                );
                if let Err(e) = executor.execute(&ctx, &CacheCommand::Prepare(prepare)) {
                    debug!(error = %e, "commit during transfer failed");
                }
            }
        });
    }

    let mut nodes = vec![seed];
    for i in 1..scenario.nodes {
        let node = TestNode::join(&cluster, &format!("node-{i}"), config.clone());
        node.start()?;
        debug!(member = %node.address(), entries = node.len(), "member joined with state");
        nodes.push(node);
    }

    let expected = snapshot(&nodes[0]);
    let expected_prepares = nodes[0].log().pending_prepares().len();
    let consistent = nodes.iter().all(|node| {
        snapshot(node) == expected && node.log().pending_prepares().len() == expected_prepares
    });

    let reports = nodes
        .iter()
        .map(|node| {
            Ok(NodeReport {
                address: node.address().to_string(),
                entries: node.len(),
                stored: node.store().len()?,
                pending_prepares: node.log().pending_prepares().len(),
                state_requests: node
                    .transport()
                    .state_requests()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                stats: node.rpc().stats().snapshot(),
            })
        })
        .collect::<NodeResult<Vec<_>>>()?;

    Ok(SimulationReport {
        nodes: reports,
        consistent,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

fn snapshot(node: &TestNode) -> BTreeMap<Vec<u8>, Vec<u8>> {
    node.container()
        .entries()
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect()
}
