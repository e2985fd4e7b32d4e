//! Simulate command implementation.

use gridcache_testkit::{scenario, Scenario, SimulationReport};
use tracing::warn;

/// Runs the simulate command.
pub fn run(scenario: &Scenario, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = scenario::run(scenario)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    if !report.consistent {
        warn!("members disagree after state transfer");
        return Err("inconsistent cluster".into());
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!("Simulation finished in {} ms", report.elapsed_ms);
    println!(
        "Consistent: {}",
        if report.consistent { "yes" } else { "NO" }
    );
    println!();
    println!(
        "{:<10} {:>8} {:>8} {:>9} {:>10} {:>9}  {}",
        "Member", "Entries", "Stored", "Prepared", "RPC calls", "Avg (us)", "Providers"
    );
    for node in &report.nodes {
        let providers = if node.state_requests.is_empty() {
            "-".to_string()
        } else {
            node.state_requests.join(", ")
        };
        println!(
            "{:<10} {:>8} {:>8} {:>9} {:>10} {:>9}  {}",
            node.address,
            node.entries,
            node.stored,
            node.pending_prepares,
            node.stats.replication_count,
            node.stats.average_replication_micros,
            providers
        );
    }
}
