//! Error types for the multipass crate.

use mpfleet_reconciler::ExecutionError;
use thiserror::Error;

/// Result type for multipass operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the multipass CLI.
#[derive(Error, Debug)]
pub enum Error {
    /// The CLI could not be started.
    #[error("failed to spawn '{cli}': {reason}")]
    Spawn { cli: String, reason: String },

    /// The CLI did not finish in time.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The CLI exited unsuccessfully.
    #[error("multipass exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The CLI printed something we could not understand.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a spawn error.
    pub fn spawn(cli: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            cli: cli.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub const fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a non-zero exit error.
    pub fn non_zero_exit(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            code,
            stderr: stderr.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }
}

impl From<Error> for ExecutionError {
    fn from(err: Error) -> Self {
        match err {
            Error::NonZeroExit { code, stderr } => Self::NonZeroExit { code, stderr },
            Error::Timeout { timeout_ms } => Self::Timeout {
                after_ms: timeout_ms,
            },
            Error::Spawn { cli, reason } => Self::Spawn {
                reason: format!("{cli}: {reason}"),
            },
            other => Self::other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_maps_to_execution_error() {
        let err = ExecutionError::from(Error::non_zero_exit(Some(2), "instance not found"));
        assert_eq!(
            err,
            ExecutionError::NonZeroExit {
                code: Some(2),
                stderr: "instance not found".to_string()
            }
        );
    }

    #[test]
    fn test_timeout_maps_to_execution_error() {
        let err = ExecutionError::from(Error::timeout(1500));
        assert_eq!(err, ExecutionError::Timeout { after_ms: 1500 });
        assert!(err.to_string().contains("1500"));
    }

    #[test]
    fn test_unparseable_listing_maps_to_other() {
        let mapped = serde_json::from_str::<serde_json::Value>("{")
            .map_err(|e| ExecutionError::from(Error::from(e)))
            .err();
        assert!(
            matches!(&mapped, Some(ExecutionError::Other { reason }) if reason.contains("JSON error")),
            "got {mapped:?}"
        );
    }
}
