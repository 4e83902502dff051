//! Transition policy: which single operation moves a machine toward its
//! desired state.
//!
//! The policy is an ordered decision table. Rows are evaluated in priority
//! order and the first match wins. Existence is settled first (launch,
//! recover), then the lifecycle state is shaped (start, suspend, stop),
//! then reclamation (delete).
//!
//! The guards partition the desired/observed domain: rows 3 to 7 only
//! match machines that exist, so at most one row ever matches a machine.
//!
//! # Stopped machines that should be suspended
//!
//! The platform cannot suspend a stopped machine. Row 4 starts it instead,
//! and the next pass (which observes `running`) issues the suspend. That
//! case converges in two passes; no compound operation is attempted.

use crate::error::{Error, Result};
use crate::types::{DesiredState, MachineId, ObservedState, Operation, TransitionInput};

/// One row of the decision table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Row number; lower rows pre-empt higher ones.
    pub priority: u8,
    /// Operation issued when the row matches.
    pub operation: Operation,
    /// Short human description of the condition.
    pub condition: &'static str,
    guard: fn(DesiredState, ObservedState) -> bool,
}

impl Rule {
    /// Whether this row applies to the pair.
    #[must_use]
    pub fn matches(&self, desired: DesiredState, observed: ObservedState) -> bool {
        (self.guard)(desired, observed)
    }
}

fn launch(desired: DesiredState, observed: ObservedState) -> bool {
    desired != DesiredState::Deleted && observed == ObservedState::NotExist
}

fn recover(desired: DesiredState, observed: ObservedState) -> bool {
    desired != DesiredState::Deleted && observed == ObservedState::Deleted
}

fn start(desired: DesiredState, observed: ObservedState) -> bool {
    desired == DesiredState::Running && observed.exists() && observed != ObservedState::Running
}

// Suspend is not accepted from stopped; start now, suspend next pass.
fn start_before_suspend(desired: DesiredState, observed: ObservedState) -> bool {
    desired == DesiredState::Suspended && observed == ObservedState::Stopped
}

fn suspend(desired: DesiredState, observed: ObservedState) -> bool {
    desired == DesiredState::Suspended
        && observed.exists()
        && !matches!(observed, ObservedState::Suspended | ObservedState::Stopped)
}

fn stop(desired: DesiredState, observed: ObservedState) -> bool {
    desired == DesiredState::Stopped && observed.exists() && observed != ObservedState::Stopped
}

fn delete(desired: DesiredState, observed: ObservedState) -> bool {
    desired == DesiredState::Deleted && observed.exists()
}

/// The decision table, in priority order.
pub const RULES: &[Rule] = &[
    Rule {
        priority: 1,
        operation: Operation::Launch,
        condition: "desired != deleted, observed == not_exist",
        guard: launch,
    },
    Rule {
        priority: 2,
        operation: Operation::Recover,
        condition: "desired != deleted, observed == deleted",
        guard: recover,
    },
    Rule {
        priority: 3,
        operation: Operation::Start,
        condition: "desired == running, observed in {stopped, suspended}",
        guard: start,
    },
    Rule {
        priority: 4,
        operation: Operation::Start,
        condition: "desired == suspended, observed == stopped",
        guard: start_before_suspend,
    },
    Rule {
        priority: 5,
        operation: Operation::Suspend,
        condition: "desired == suspended, observed == running",
        guard: suspend,
    },
    Rule {
        priority: 6,
        operation: Operation::Stop,
        condition: "desired == stopped, observed in {running, suspended}",
        guard: stop,
    },
    Rule {
        priority: 7,
        operation: Operation::Delete,
        condition: "desired == deleted, observed in {stopped, suspended, running}",
        guard: delete,
    },
];

/// Operation that moves the machine one step toward `desired`, if any.
///
/// Total and pure. A desired `suspended` machine observed `stopped` gets
/// [`Operation::Start`]; the suspend follows on a later pass.
#[must_use]
pub fn decide(desired: DesiredState, observed: ObservedState) -> Option<Operation> {
    RULES
        .iter()
        .find(|rule| rule.matches(desired, observed))
        .map(|rule| rule.operation)
}

/// Every row whose guard holds for the pair.
pub fn matching_rules(
    desired: DesiredState,
    observed: ObservedState,
) -> impl Iterator<Item = &'static Rule> {
    RULES
        .iter()
        .filter(move |rule| rule.matches(desired, observed))
}

/// [`decide`], refusing to pick when the table is ambiguous for the pair.
///
/// # Errors
///
/// Returns [`Error::PolicyViolation`] when more than one row matches.
pub fn decide_checked(
    machine: &MachineId,
    desired: DesiredState,
    observed: ObservedState,
) -> Result<Option<Operation>> {
    let matched: Vec<&Rule> = matching_rules(desired, observed).collect();
    match matched.as_slice() {
        [] => Ok(None),
        [rule] => Ok(Some(rule.operation)),
        many => Err(Error::policy_violation(
            machine,
            many.iter().map(|rule| rule.priority).collect(),
        )),
    }
}

/// [`decide_checked`] applied to a transition input.
///
/// # Errors
///
/// Returns [`Error::PolicyViolation`] when more than one row matches.
pub fn decide_for(input: &TransitionInput) -> Result<Option<Operation>> {
    decide_checked(input.id(), input.desired(), input.observed())
}
