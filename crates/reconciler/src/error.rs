//! Error types for the reconciler crate.

use thiserror::Error;

use crate::types::MachineId;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A fleet or observed-state record could not be turned into a transition input.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// More than one decision rule matched a single machine.
    #[error("policy violation for machine '{machine}': rows {rows:?} all matched")]
    PolicyViolation { machine: String, rows: Vec<u8> },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invalid state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a policy violation error.
    pub fn policy_violation(machine: &MachineId, rows: Vec<u8>) -> Self {
        Self::PolicyViolation {
            machine: machine.to_string(),
            rows,
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole pass rather than a single machine.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. } | Self::InvalidConfig { .. })
    }
}
