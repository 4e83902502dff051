//! Desired-vs-observed reconciliation for a fleet of virtual machines.
//!
//! This crate decides which lifecycle operation each machine needs and
//! drives those operations through an executor:
//!
//! - **Desired State**: what the fleet declares for each machine
//! - **Observed State**: what discovery reported before the pass
//! - **Policy**: an ordered decision table mapping the pair to at most one operation
//! - **Reconciler**: dispatches operations grouped by kind and reports per machine
//!
//! # Operations
//!
//! - `Launch` - create a machine that never existed
//! - `Recover` - undelete a machine held in the deleted state
//! - `Start` - bring a machine to running
//! - `Suspend` - suspend a running machine
//! - `Stop` - stop a machine
//! - `Delete` - reclaim a machine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mpfleet_reconciler::{
//!     CancelSignal, DesiredState, FleetSnapshot, FleetSpec, MachineSpec, ObservedSnapshot,
//!     ObservedState, ReconcilerBuilder, RunMode,
//! };
//!
//! let fleet = FleetSpec::new().with(MachineSpec::new("192.168.64.10", DesiredState::Stopped));
//! let observed = ObservedSnapshot::new().with("192.168.64.10", ObservedState::Running);
//! let snapshot = FleetSnapshot::build(&fleet, &observed);
//!
//! let reconciler = ReconcilerBuilder::new().with_executor(Arc::new(executor)).build()?;
//! let report = reconciler
//!     .reconcile(&snapshot, RunMode::Apply, &CancelSignal::never())
//!     .await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod executor;
pub mod policy;
pub mod reconciler;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use executor::{ExecutionError, ExecutionOutput, MachineExecutor};
pub use policy::{Rule, decide, decide_checked, matching_rules};
pub use reconciler::{
    CancelHandle, CancelSignal, MachineOutcome, MachineReport, Plan, ReconcileReport, Reconciler,
    ReconcilerBuilder, ReconcilerConfig, RunMode,
};
pub use types::{
    CreationParams, DesiredState, FleetMember, FleetSnapshot, FleetSpec, MachineId, MachineSpec,
    MachineTarget, NetworkAttachment, ObservedSnapshot, ObservedState, Operation, SnapshotEntry,
    TransitionInput,
};
