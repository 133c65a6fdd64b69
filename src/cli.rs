//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Concord - expert agents merging their proposals on a shared blackboard
#[derive(Parser, Debug)]
#[command(name = "concord")]
#[command(version)]
#[command(about = "Coordinate expert agents over a vector-clocked blackboard")]
pub struct Cli {
    /// Settings file (TOML with [bus], [blackboard] and [orchestrator] sections)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run one session over a requirement and print the outcome as JSON
    Process {
        /// Natural-language requirement
        text: String,

        /// Override the dispatch deadline, in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Validate a settings file
    CheckConfig {
        /// Settings file to check
        file: PathBuf,
    },

    /// List the registered experts with authority and weight
    Agents,
}
