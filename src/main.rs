//! # mpfleet - entry point
//!
//! Exit codes:
//!
//! - `0` every machine converged, was already converged, or (dry run) was planned
//! - `1` at least one machine failed or was rejected
//! - `2` the pass could not run (unreadable inputs, bad configuration,
//!   discovery failure, policy violation)
//! - `130` Ctrl+C cancelled the pass before every group ran

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mpfleet::cli::Cli;
use mpfleet::commands::execute_command;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing();

    match execute_command(cli.command).await {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Initialize tracing subscriber with environment filter.
///
/// Logs go to stderr so stdout stays clean for the report.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
