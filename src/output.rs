//! Rendering of reconciliation reports.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use mpfleet_reconciler::{MachineOutcome, ReconcileReport, RunMode};

/// Render a report as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(report: &ReconcileReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

/// Render a report as a plain-text table followed by a summary line.
pub fn render_table(report: &ReconcileReport) -> String {
    let id_width = report
        .machines
        .iter()
        .map(|m| m.id.as_str().len())
        .max()
        .unwrap_or(0)
        .max("MACHINE".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<12}  {:<9}  DETAILS",
        "MACHINE", "OUTCOME", "OPERATION"
    );
    for machine in &report.machines {
        let operation = machine
            .outcome
            .operation()
            .map_or_else(|| "-".to_string(), |op| op.to_string());
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<12}  {:<9}  {}",
            machine.id.as_str(),
            machine.outcome.label(),
            operation,
            details(&machine.outcome)
        );
    }

    let summary = report
        .summary()
        .into_iter()
        .map(|(label, count)| format!("{count} {label}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mode = match report.mode {
        RunMode::Apply => "apply",
        RunMode::DryRun => "dry run",
    };
    let _ = write!(out, "\n{mode}: {summary}");
    if report.cancelled {
        out.push_str(" (cancelled)");
    }
    out.push('\n');
    out
}

fn details(outcome: &MachineOutcome) -> String {
    match outcome {
        MachineOutcome::Failed { details, .. } => details.clone(),
        MachineOutcome::Rejected { reason } => reason.clone(),
        MachineOutcome::Changed { output, .. } => output
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string(),
        MachineOutcome::Unchanged
        | MachineOutcome::WouldChange { .. }
        | MachineOutcome::Cancelled { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use chrono::Utc;
    use mpfleet_reconciler::{ExecutionOutput, MachineId, MachineReport, Operation};

    fn report() -> ReconcileReport {
        let now = Utc::now();
        ReconcileReport {
            mode: RunMode::Apply,
            cancelled: false,
            started_at: now,
            finished_at: now,
            machines: vec![
                MachineReport {
                    id: MachineId::from("192.168.64.10"),
                    outcome: MachineOutcome::Changed {
                        operation: Operation::Start,
                        output: ExecutionOutput::new("Starting node-a\n", ""),
                    },
                },
                MachineReport {
                    id: MachineId::from("192.168.64.11"),
                    outcome: MachineOutcome::Unchanged,
                },
                MachineReport {
                    id: MachineId::from("192.168.64.12"),
                    outcome: MachineOutcome::Failed {
                        operation: Operation::Delete,
                        details: "exited with status Some(2): busy".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_table_lists_every_machine() {
        let table = render_table(&report());
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 6);
        assert!(lines.first().is_some_and(|l| l.starts_with("MACHINE")));
        assert!(table.contains("Starting node-a"));
        assert!(table.contains("delete"));
        assert!(table.ends_with("apply: 1 changed, 1 failed, 1 unchanged\n"));
    }

    #[test]
    fn test_json_is_tagged_by_outcome() {
        let json = render_json(&report()).unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap_or_default();

        assert_eq!(value["mode"], "apply");
        assert_eq!(value["machines"][0]["outcome"], "changed");
        assert_eq!(value["machines"][0]["operation"], "start");
        assert_eq!(value["machines"][2]["details"], "exited with status Some(2): busy");
    }
}
