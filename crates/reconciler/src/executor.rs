//! Boundary to whatever actually runs lifecycle operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MachineTarget, Operation};

/// Output captured from a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Failure reported by an executor for one dispatched operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The command ran and exited unsuccessfully.
    #[error("exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The command could not be started.
    #[error("failed to spawn: {reason}")]
    Spawn { reason: String },

    /// The command did not finish in time.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// A launch was requested without creation parameters.
    #[error("machine '{machine}' has no creation parameters")]
    MissingParams { machine: String },

    /// Anything else the executor wants to surface.
    #[error("{reason}")]
    Other { reason: String },
}

impl ExecutionError {
    /// Create a non-zero exit error.
    pub fn non_zero_exit(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            code,
            stderr: stderr.into(),
        }
    }

    /// Create a spawn error.
    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn {
            reason: reason.into(),
        }
    }

    /// Create an error from a free-form message.
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }
}

/// Runs one lifecycle operation against one machine.
///
/// Implementations own their timeouts and must return an error rather than
/// block forever. The reconciler never retries a failed call.
#[async_trait]
pub trait MachineExecutor: Send + Sync {
    /// Execute `operation` against `target`.
    async fn execute(
        &self,
        target: &MachineTarget,
        operation: Operation,
    ) -> Result<ExecutionOutput, ExecutionError>;
}
