//! Integration tests for running a pass from fleet and observed files.
//!
//! Every pass here either runs dry or finds nothing to do, so the multipass
//! CLI is never invoked.

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]

use std::io::Write;
use std::path::PathBuf;

use mpfleet::cli::PassArgs;
use mpfleet::commands::{PassStatus, run_pass};
use mpfleet_reconciler::{MachineId, MachineOutcome, Operation, RunMode};
use tempfile::{NamedTempFile, TempDir};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FLEET: &str = r"
vm_names:
  192.168.64.10: node-a
  192.168.64.11: node-b
  192.168.64.12: node-c
  192.168.64.13: node-d
multipass_vm_instances:
  - static_ip: 192.168.64.10
    state: running
    vcpu: 2
    disk: 10G
    mem: 2G
  - static_ip: 192.168.64.11
    state: suspended
  - static_ip: 192.168.64.12
    state: deleted
  - static_ip: 192.168.64.13
    state: stopped
";

fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

fn args(fleet: PathBuf, observed: PathBuf) -> PassArgs {
    PassArgs {
        fleet,
        observed: Some(observed),
        config: None,
        json: false,
    }
}

/// # GIVEN
/// A fleet with one machine per lifecycle path
///
/// # WHEN
/// A dry run is requested
///
/// # THEN
/// Every intended operation is reported and nothing is dispatched
#[tokio::test]
async fn test_dry_run_reports_intended_operations() -> TestResult {
    let dir = TempDir::new()?;
    let fleet = write_file(&dir, "fleet.yml", FLEET)?;
    let observed = write_file(
        &dir,
        "observed.yml",
        "192.168.64.11: stopped\n192.168.64.12: running\n192.168.64.13: stopped\n",
    )?;

    let report = run_pass(&args(fleet, observed), RunMode::DryRun, None).await?;

    assert_eq!(report.mode, RunMode::DryRun);
    let intended: Vec<(String, Operation)> = report
        .intended_operations()
        .into_iter()
        .map(|(id, op)| (id.to_string(), op))
        .collect();
    assert_eq!(
        intended,
        vec![
            ("192.168.64.10".to_string(), Operation::Launch),
            ("192.168.64.11".to_string(), Operation::Start),
            ("192.168.64.12".to_string(), Operation::Delete),
        ]
    );
    assert_eq!(
        report.outcome(&MachineId::from("192.168.64.13")),
        Some(&MachineOutcome::Unchanged)
    );
    assert!(report.machines.iter().all(|m| !m.outcome.was_dispatched()));
    assert_eq!(PassStatus::of(&report), PassStatus::Clean);
    Ok(())
}

/// # GIVEN
/// An observed file with a state discovery could not have produced
///
/// # WHEN
/// A pass runs
///
/// # THEN
/// Only that machine is rejected and the pass reports failures
#[tokio::test]
async fn test_unknown_observed_state_rejects_one_machine() -> TestResult {
    let dir = TempDir::new()?;
    let fleet = write_file(&dir, "fleet.yml", FLEET)?;
    let observed = write_file(
        &dir,
        "observed.json",
        r#"{"192.168.64.10": "running", "192.168.64.11": "hibernating",
            "192.168.64.12": "not_exist", "192.168.64.13": "stopped"}"#,
    )?;

    let report = run_pass(&args(fleet, observed), RunMode::Apply, None).await?;

    let rejected: Vec<&str> = report.rejected().map(|m| m.id.as_str()).collect();
    assert_eq!(rejected, vec!["192.168.64.11"]);
    assert!(report.changed().next().is_none());
    assert_eq!(PassStatus::of(&report), PassStatus::Failures);
    Ok(())
}

/// # GIVEN
/// A fleet that already matches what is observed
///
/// # WHEN
/// A real pass runs
///
/// # THEN
/// Everything is unchanged and the pass is clean
#[tokio::test]
async fn test_converged_fleet_is_clean() -> TestResult {
    let dir = TempDir::new()?;
    let fleet = write_file(&dir, "fleet.yml", FLEET)?;
    let observed = write_file(
        &dir,
        "observed.yml",
        "192.168.64.10: running\n192.168.64.11: suspended\n192.168.64.13: stopped\n",
    )?;

    let report = run_pass(&args(fleet, observed), RunMode::Apply, None).await?;

    assert!(report.is_converged());
    assert_eq!(PassStatus::of(&report).code(), 0);
    Ok(())
}

/// # GIVEN
/// A config file with an unusable concurrency cap
///
/// # WHEN
/// A pass runs
///
/// # THEN
/// The pass fails before anything is planned
#[tokio::test]
async fn test_invalid_config_fails_the_pass() -> TestResult {
    let dir = TempDir::new()?;
    let fleet = write_file(&dir, "fleet.yml", FLEET)?;
    let observed = write_file(&dir, "observed.yml", "{}")?;
    let mut config = NamedTempFile::new_in(dir.path())?;
    writeln!(config, "[reconciler]\nmax_concurrent = 0")?;

    let mut pass = args(fleet, observed);
    pass.config = Some(config.path().to_path_buf());
    let result = run_pass(&pass, RunMode::DryRun, Some(0)).await;

    let message = result.err().map(|e| format!("{e:#}")).unwrap_or_default();
    assert!(message.contains("max_concurrent"), "got: {message}");
    Ok(())
}

/// # GIVEN
/// A fleet path that does not exist
///
/// # WHEN
/// A pass runs
///
/// # THEN
/// The error names the file
#[tokio::test]
async fn test_missing_fleet_file_is_an_error() -> TestResult {
    let dir = TempDir::new()?;
    let observed = write_file(&dir, "observed.yml", "{}")?;
    let missing = dir.path().join("nope.yml");

    let result = run_pass(&args(missing, observed), RunMode::DryRun, None).await;

    let message = result.err().map(|e| format!("{e:#}")).unwrap_or_default();
    assert!(message.contains("nope.yml"), "got: {message}");
    Ok(())
}
