//! # Concord
//!
//! Entry point for the `concord` binary.
//!
//! Logs go to stderr through `tracing-subscriber` (`RUST_LOG` overrides the default
//! `info` filter) so that stdout carries only the JSON output of each command.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use concord::cli::Cli;
use concord::commands::execute;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    execute(Cli::parse()).await
}

/// Initialize tracing subscriber.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
