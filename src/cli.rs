//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// mpfleet - multipass fleet reconciler
#[derive(Parser, Debug)]
#[command(name = "mpfleet")]
#[command(version)]
#[command(about = "Converge a declared fleet of multipass virtual machines")]
#[command(
    long_about = "mpfleet compares the lifecycle state each machine should be in with the state multipass reports, and launches, recovers, starts, suspends, stops or deletes instances until they match."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one reconciliation pass
    Reconcile {
        #[command(flatten)]
        pass: PassArgs,

        /// Report what would change without dispatching anything
        #[arg(short = 'n', long, default_value_t = false)]
        dry_run: bool,

        /// Maximum operations of one kind in flight at once
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Show the operations a pass would dispatch
    Plan {
        #[command(flatten)]
        pass: PassArgs,
    },
}

/// Inputs shared by every pass-running command.
#[derive(Args, Debug, Clone)]
pub struct PassArgs {
    /// Fleet file (YAML with a `multipass_vm_instances` list)
    #[arg(short, long)]
    pub fleet: PathBuf,

    /// Observed states file (`static_ip: state`); queries multipass when absent
    #[arg(short, long)]
    pub observed: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
