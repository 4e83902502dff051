//! CLI command handlers.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use mpfleet_multipass::{MultipassClient, MultipassExecutor, MultipassInventory};
use mpfleet_reconciler::{
    CancelHandle, FleetSnapshot, FleetSpec, ObservedSnapshot, ReconcileReport, ReconcilerBuilder,
    RunMode,
};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::{Commands, PassArgs};
use crate::config::AppConfig;
use crate::fleet_file::{load_fleet, load_observed};
use crate::output::{render_json, render_table};

/// How a completed pass went, for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// No machine failed or was rejected.
    Clean,
    /// At least one machine failed or was rejected.
    Failures,
    /// Ctrl+C stopped the pass before every group ran.
    Cancelled,
}

impl PassStatus {
    /// An interrupted pass is never clean, even if nothing it reached failed.
    #[must_use]
    pub fn of(report: &ReconcileReport) -> Self {
        if report.cancelled {
            Self::Cancelled
        } else if report.has_failures() {
            Self::Failures
        } else {
            Self::Clean
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Failures => 1,
            Self::Cancelled => 130,
        }
    }
}

impl From<PassStatus> for ExitCode {
    fn from(status: PassStatus) -> Self {
        Self::from(status.code())
    }
}

/// Execute a CLI command.
///
/// # Errors
///
/// Returns an error when the pass itself could not run.
pub async fn execute_command(command: Commands) -> Result<PassStatus> {
    match command {
        Commands::Reconcile {
            pass,
            dry_run,
            max_concurrent,
        } => cmd_pass(&pass, RunMode::from_dry_run(dry_run), max_concurrent).await,

        Commands::Plan { pass } => cmd_pass(&pass, RunMode::DryRun, None).await,
    }
}

async fn cmd_pass(
    args: &PassArgs,
    mode: RunMode,
    max_concurrent: Option<usize>,
) -> Result<PassStatus> {
    let report = run_pass(args, mode, max_concurrent).await?;

    if args.json {
        println!("{}", render_json(&report)?);
    } else {
        print!("{}", render_table(&report));
    }

    Ok(PassStatus::of(&report))
}

/// Load inputs, observe the fleet and run one reconciliation pass.
///
/// Ctrl+C during the pass skips the groups that have not started yet.
///
/// # Errors
///
/// Returns an error for unreadable inputs, invalid configuration, failed
/// discovery or a pass-level policy error.
pub async fn run_pass(
    args: &PassArgs,
    mode: RunMode,
    max_concurrent: Option<usize>,
) -> Result<ReconcileReport> {
    let config = AppConfig::load(args.config.as_deref())?.with_max_concurrent(max_concurrent);
    let fleet = load_fleet(&args.fleet)?;
    let observed = observe(args, &config, &fleet).await?;
    let snapshot = FleetSnapshot::build(&fleet, &observed);

    let reconciler = ReconcilerBuilder::new()
        .with_executor(Arc::new(MultipassExecutor::with_config(
            config.multipass.clone(),
        )))
        .with_config(config.reconciler.clone())
        .build()
        .context("Invalid reconciler configuration")?;

    let cancel = CancelHandle::new();
    let cancel_signal = cancel.signal();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel));

    let result = reconciler.reconcile(&snapshot, mode, &cancel_signal).await;
    watcher.abort();

    let report = result.context("Reconciliation pass failed")?;
    info!(summary = ?report.summary(), "Pass complete");
    Ok(report)
}

async fn observe(
    args: &PassArgs,
    config: &AppConfig,
    fleet: &FleetSpec,
) -> Result<ObservedSnapshot> {
    if let Some(path) = &args.observed {
        return load_observed(path);
    }
    let inventory = MultipassInventory::new(MultipassClient::with_config(config.multipass.clone()));
    inventory
        .observe(fleet)
        .await
        .context("Failed to query multipass for instance states")
}

async fn cancel_on_ctrl_c(cancel: CancelHandle) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, skipping operations not yet started");
            cancel.cancel();
        }
        Err(err) => warn!("Failed to listen for Ctrl+C: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mpfleet_reconciler::{MachineId, MachineOutcome, MachineReport, Operation};

    use super::*;

    fn report(cancelled: bool, outcomes: Vec<MachineOutcome>) -> ReconcileReport {
        let now = Utc::now();
        ReconcileReport {
            mode: RunMode::Apply,
            cancelled,
            started_at: now,
            finished_at: now,
            machines: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| MachineReport {
                    id: MachineId::from(format!("10.0.0.{i}")),
                    outcome,
                })
                .collect(),
        }
    }

    #[test]
    fn test_cancelled_pass_is_not_clean() {
        let cancelled = report(
            true,
            vec![MachineOutcome::Unchanged, MachineOutcome::Cancelled { operation: Operation::Delete }],
        );

        assert_eq!(PassStatus::of(&cancelled), PassStatus::Cancelled);
        assert_eq!(PassStatus::of(&cancelled).code(), 130);
    }

    #[test]
    fn test_status_codes_for_completed_passes() {
        let clean = report(false, vec![MachineOutcome::Unchanged]);
        let rejected = report(
            false,
            vec![MachineOutcome::Rejected { reason: "unknown state".to_string() }],
        );

        assert_eq!(PassStatus::of(&clean).code(), 0);
        assert_eq!(PassStatus::of(&rejected), PassStatus::Failures);
        assert_eq!(PassStatus::of(&rejected).code(), 1);
    }
}
