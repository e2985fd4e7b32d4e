//! gridcache CLI
//!
//! Command-line tools for exercising gridcache state transfer.
//!
//! # Commands
//!
//! - `simulate` - Join members to an in-process cluster and report the
//!   state each one ends up with
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// gridcache command-line tools.
#[derive(Parser)]
#[command(name = "gridcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed one member, join the others and compare their state
    Simulate {
        /// Members in total, the seeding member included
        #[arg(short, long, default_value = "3")]
        nodes: usize,

        /// Entries written before anyone joins
        #[arg(short, long, default_value = "100")]
        entries: usize,

        /// Transfer persistent state as well
        #[arg(short, long)]
        persistent: bool,

        /// Transactions committed while the first joiner receives state
        #[arg(short, long, default_value = "10")]
        commits: usize,

        /// Transactions left prepared but unresolved
        #[arg(long, default_value = "5")]
        prepares: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            nodes,
            entries,
            persistent,
            commits,
            prepares,
            format,
        } => {
            if nodes == 0 {
                return Err("at least one node is required".into());
            }
            let scenario = gridcache_testkit::Scenario {
                nodes,
                entries,
                persistent,
                commits,
                prepares,
            };
            commands::simulate::run(&scenario, &format)?;
        }
        Commands::Version => {
            println!("gridcache CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("gridcache Core v{}", gridcache_core::VERSION);
        }
    }

    Ok(())
}
