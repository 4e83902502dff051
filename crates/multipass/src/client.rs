//! Thin async wrapper around the multipass CLI.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use mpfleet_reconciler::ExecutionOutput;
use tokio::process::Command;
use tracing::debug;

use crate::config::MultipassConfig;
use crate::error::{Error, Result};

/// Client for running multipass subcommands.
#[derive(Debug, Clone)]
pub struct MultipassClient {
    /// Configuration for the client.
    config: Arc<MultipassConfig>,
}

impl MultipassClient {
    /// Create a new client with default configuration.
    pub fn new() -> Self {
        Self::with_config(MultipassConfig::default())
    }

    /// Create a new client with custom configuration.
    pub fn with_config(config: MultipassConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MultipassConfig {
        &self.config
    }

    /// Run `multipass <args>` and capture its output.
    ///
    /// The child is killed if it outlives the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`], [`Error::Timeout`] or [`Error::NonZeroExit`].
    pub async fn run(&self, args: &[String]) -> Result<ExecutionOutput> {
        let cli = &self.config.cli_path;
        debug!(cli = %cli, args = ?args, "Running multipass CLI");
        let start = Instant::now();

        let child = Command::new(cli)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn(cli.as_str(), e.to_string()))?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::timeout(u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX))
            })?
            .map_err(|e| Error::spawn(cli.as_str(), format!("failed to wait: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(
            status = %output.status,
            duration_ms = start.elapsed().as_millis(),
            "multipass CLI finished"
        );

        if !output.status.success() {
            return Err(Error::non_zero_exit(output.status.code(), stderr.trim()));
        }

        Ok(ExecutionOutput::new(stdout, stderr))
    }

    /// Check if multipass is available.
    pub async fn is_available(&self) -> bool {
        let result = Command::new(&self.config.cli_path)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        result.is_ok_and(|status| status.success())
    }

    /// Get the version of multipass.
    ///
    /// # Errors
    ///
    /// Returns an error when the CLI cannot be run.
    pub async fn version(&self) -> Result<String> {
        let output = self.run(&["version".to_string()]).await?;
        Ok(output
            .stdout
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl Default for MultipassClient {
    fn default() -> Self {
        Self::new()
    }
}
