//! Reconciler implementation.
//!
//! A pass plans every machine up front, then dispatches the planned
//! operations one kind-group at a time in [`Operation`] order. A group runs
//! concurrently up to `max_concurrent` and is fully settled before the next
//! group starts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{ExecutionOutput, MachineExecutor};
use crate::policy;
use crate::types::{FleetSnapshot, MachineId, MachineTarget, Operation, SnapshotEntry};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Maximum operations of one kind in flight at once.
    pub max_concurrent: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

impl ReconcilerConfig {
    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `max_concurrent` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::invalid_config("max_concurrent must be at least 1"));
        }
        Ok(())
    }
}

/// Whether a pass dispatches operations or only reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Apply,
    DryRun,
}

impl RunMode {
    #[must_use]
    pub const fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Apply }
    }
}

/// Caller side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle with no cancellation requested.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request cancellation. Groups not yet started are skipped.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// A signal observing this handle.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconciler side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Result for one machine of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MachineOutcome {
    /// Already converged; nothing to do.
    Unchanged,
    /// Dry run: this operation would have been dispatched.
    WouldChange { operation: Operation },
    /// The operation was dispatched and succeeded.
    Changed {
        operation: Operation,
        output: ExecutionOutput,
    },
    /// The operation was dispatched and failed.
    Failed { operation: Operation, details: String },
    /// The input record was malformed; nothing was dispatched.
    Rejected { reason: String },
    /// The pass was cancelled before this operation's group started.
    Cancelled { operation: Operation },
}

impl MachineOutcome {
    /// Operation computed for the machine, if any.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::WouldChange { operation }
            | Self::Changed { operation, .. }
            | Self::Failed { operation, .. }
            | Self::Cancelled { operation } => Some(*operation),
            Self::Unchanged | Self::Rejected { .. } => None,
        }
    }

    /// Whether the operation reached the executor.
    #[must_use]
    pub const fn was_dispatched(&self) -> bool {
        matches!(self, Self::Changed { .. } | Self::Failed { .. })
    }

    /// Short label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::WouldChange { .. } => "would change",
            Self::Changed { .. } => "changed",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Outcome of one machine, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReport {
    pub id: MachineId,
    #[serde(flatten)]
    pub outcome: MachineOutcome,
}

/// Result of a reconciliation pass, in fleet declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub mode: RunMode,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub machines: Vec<MachineReport>,
}

impl ReconcileReport {
    /// Outcome for a machine (first occurrence).
    #[must_use]
    pub fn outcome(&self, id: &MachineId) -> Option<&MachineOutcome> {
        self.machines
            .iter()
            .find(|m| &m.id == id)
            .map(|m| &m.outcome)
    }

    /// Operations that were dispatched, or would have been under a dry run.
    #[must_use]
    pub fn intended_operations(&self) -> BTreeSet<(MachineId, Operation)> {
        self.machines
            .iter()
            .filter(|m| {
                matches!(m.outcome, MachineOutcome::WouldChange { .. }) || m.outcome.was_dispatched()
            })
            .filter_map(|m| m.outcome.operation().map(|op| (m.id.clone(), op)))
            .collect()
    }

    /// Machines whose operation succeeded.
    pub fn changed(&self) -> impl Iterator<Item = &MachineReport> {
        self.machines
            .iter()
            .filter(|m| matches!(m.outcome, MachineOutcome::Changed { .. }))
    }

    /// Machines whose operation failed.
    pub fn failed(&self) -> impl Iterator<Item = &MachineReport> {
        self.machines
            .iter()
            .filter(|m| matches!(m.outcome, MachineOutcome::Failed { .. }))
    }

    /// Machines whose input was rejected.
    pub fn rejected(&self) -> impl Iterator<Item = &MachineReport> {
        self.machines
            .iter()
            .filter(|m| matches!(m.outcome, MachineOutcome::Rejected { .. }))
    }

    /// True when every machine was already converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.machines
            .iter()
            .all(|m| m.outcome == MachineOutcome::Unchanged)
    }

    /// True when any machine failed or was rejected.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some() || self.rejected().next().is_some()
    }

    /// Count of machines per outcome label.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        self.machines.iter().counts_by(|m| m.outcome.label()).into_iter().collect()
    }
}

/// What the policy decided for one snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Rejected { reason: String },
    Unchanged,
    Dispatch {
        operation: Operation,
        target: MachineTarget,
    },
}

/// Planned decision for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSlot {
    pub id: MachineId,
    pub decision: Decision,
}

/// Per-machine decisions for a whole snapshot, before any dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    slots: Vec<PlanSlot>,
}

impl Plan {
    /// Run the transition policy over every ready machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyViolation`] if the decision table is ambiguous
    /// for any machine. This aborts the whole pass.
    pub fn build(snapshot: &FleetSnapshot) -> Result<Self> {
        let slots = snapshot
            .entries()
            .map(|entry| match entry {
                SnapshotEntry::Rejected { id, error } => Ok(PlanSlot {
                    id: id.clone(),
                    decision: Decision::Rejected {
                        reason: error.to_string(),
                    },
                }),
                SnapshotEntry::Ready(input) => {
                    let decision = match policy::decide_for(input)? {
                        None => Decision::Unchanged,
                        Some(operation) => Decision::Dispatch {
                            operation,
                            target: input.target(),
                        },
                    };
                    Ok(PlanSlot {
                        id: input.id().clone(),
                        decision,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    pub fn slots(&self) -> impl Iterator<Item = &PlanSlot> {
        self.slots.iter()
    }

    /// Planned operations grouped by kind, in dispatch order.
    ///
    /// Each entry carries the slot index so results can be merged back.
    #[must_use]
    pub fn groups(&self) -> BTreeMap<Operation, Vec<(usize, &MachineTarget)>> {
        let mut groups: BTreeMap<Operation, Vec<(usize, &MachineTarget)>> = BTreeMap::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Decision::Dispatch { operation, target } = &slot.decision {
                groups.entry(*operation).or_default().push((index, target));
            }
        }
        groups
    }

    /// Number of machines that need an operation.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.decision, Decision::Dispatch { .. }))
            .count()
    }
}

impl PlanSlot {
    // Outcome before (or without) dispatch.
    fn initial_outcome(&self, mode: RunMode) -> Option<MachineOutcome> {
        match (&self.decision, mode) {
            (Decision::Rejected { reason }, _) => Some(MachineOutcome::Rejected {
                reason: reason.clone(),
            }),
            (Decision::Unchanged, _) => Some(MachineOutcome::Unchanged),
            (Decision::Dispatch { operation, .. }, RunMode::DryRun) => {
                Some(MachineOutcome::WouldChange {
                    operation: *operation,
                })
            }
            (Decision::Dispatch { .. }, RunMode::Apply) => None,
        }
    }

    fn cancelled_outcome(&self) -> MachineOutcome {
        match &self.decision {
            Decision::Dispatch { operation, .. } => MachineOutcome::Cancelled {
                operation: *operation,
            },
            Decision::Rejected { reason } => MachineOutcome::Rejected {
                reason: reason.clone(),
            },
            Decision::Unchanged => MachineOutcome::Unchanged,
        }
    }
}

/// Reconciler for a multipass fleet.
pub struct Reconciler {
    /// Action executor.
    executor: Arc<dyn MachineExecutor>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(executor: Arc<dyn MachineExecutor>, config: ReconcilerConfig) -> Self {
        Self { executor, config }
    }

    /// Run one reconciliation pass over the snapshot.
    ///
    /// Per-machine failures are recorded in the report and never stop the
    /// pass. Cancellation is checked before each kind-group; operations
    /// already handed to the executor are not rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyViolation`] when the decision table is unsound
    /// for some machine; nothing is dispatched in that case.
    pub async fn reconcile(
        &self,
        snapshot: &FleetSnapshot,
        mode: RunMode,
        cancel: &CancelSignal,
    ) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        info!(
            machines = snapshot.len(),
            rejected = snapshot.rejected().count(),
            mode = ?mode,
            "Starting reconciliation"
        );

        let plan = Plan::build(snapshot)?;
        debug!(operations = plan.operation_count(), "Planned operations");

        let mut outcomes: Vec<Option<MachineOutcome>> =
            plan.slots().map(|slot| slot.initial_outcome(mode)).collect();

        let mut cancelled = false;
        if mode == RunMode::Apply {
            for (operation, group) in plan.groups() {
                if cancel.is_cancelled() {
                    warn!(next = %operation, "Reconciliation cancelled; skipping remaining groups");
                    cancelled = true;
                    break;
                }
                info!(operation = %operation, machines = group.len(), "Dispatching group");
                for (index, outcome) in self.dispatch_group(operation, group).await {
                    if let Some(slot) = outcomes.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
            }
        }

        let machines = plan
            .slots()
            .zip(outcomes)
            .map(|(slot, outcome)| MachineReport {
                id: slot.id.clone(),
                outcome: outcome.unwrap_or_else(|| slot.cancelled_outcome()),
            })
            .collect();

        let report = ReconcileReport {
            mode,
            cancelled,
            started_at,
            finished_at: Utc::now(),
            machines,
        };

        if report.is_converged() {
            info!("Fleet converged");
        } else {
            info!(summary = ?report.summary(), cancelled, "Reconciliation complete");
        }
        Ok(report)
    }

    /// Dispatch one kind-group, at most `max_concurrent` at a time.
    async fn dispatch_group(
        &self,
        operation: Operation,
        group: Vec<(usize, &MachineTarget)>,
    ) -> Vec<(usize, MachineOutcome)> {
        let executor = self.executor.as_ref();
        stream::iter(group)
            .map(|(index, target)| async move {
                (index, dispatch(executor, target, operation).await)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

async fn dispatch(
    executor: &dyn MachineExecutor,
    target: &MachineTarget,
    operation: Operation,
) -> MachineOutcome {
    debug!(machine = %target.id, name = %target.name, operation = %operation, "Applying operation");

    match executor.execute(target, operation).await {
        Ok(output) => {
            debug!(machine = %target.id, operation = %operation, "Operation succeeded");
            MachineOutcome::Changed { operation, output }
        }
        Err(e) => {
            warn!(machine = %target.id, operation = %operation, error = %e, "Operation failed");
            MachineOutcome::Failed {
                operation,
                details: e.to_string(),
            }
        }
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    executor: Option<Arc<dyn MachineExecutor>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            executor: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn MachineExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-group concurrency cap.
    #[must_use]
    pub const fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] without an executor or with an
    /// invalid configuration.
    pub fn build(self) -> Result<Reconciler> {
        self.config.validate()?;
        let executor = self
            .executor
            .ok_or_else(|| Error::invalid_config("an executor is required"))?;
        Ok(Reconciler::new(executor, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
