//! Application configuration: `mpfleet.toml`, then environment, then flags.

use std::path::Path;

use anyhow::{Context, Result};
use mpfleet_multipass::MultipassConfig;
use mpfleet_reconciler::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Everything the binary can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub multipass: MultipassConfig,
}

impl AppConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed TOML or mistyped fields.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse configuration")
    }

    /// Load configuration from `path` (defaults when `None`) and apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Apply `MPFLEET_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.multipass = self.multipass.with_env_overrides();
        if let Some(max) = std::env::var("MPFLEET_MAX_CONCURRENT")
            .ok()
            .and_then(|raw| parse_max_concurrent(&raw))
        {
            self.reconciler.max_concurrent = max;
        }
        self
    }

    /// Apply command-line overrides, which win over file and environment.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        if let Some(max) = max_concurrent {
            self.reconciler.max_concurrent = max;
        }
        self
    }
}

/// Parse a `MPFLEET_MAX_CONCURRENT` value; garbage is logged and ignored.
fn parse_max_concurrent(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| warn!(value = raw, error = %e, "Ignoring unparseable MPFLEET_MAX_CONCURRENT"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").ok();
        assert_eq!(config.map(|c| c.reconciler), Some(ReconcilerConfig::default()));
    }

    #[test]
    fn test_sections_are_parsed() {
        let config = AppConfig::from_toml(
            r#"
            [reconciler]
            max_concurrent = 8

            [multipass]
            cli_path = "/snap/bin/multipass"
            timeout = 90
            "#,
        )
        .ok();

        assert_eq!(config.as_ref().map(|c| c.reconciler.max_concurrent), Some(8));
        assert_eq!(
            config.as_ref().map(|c| c.multipass.cli_path.as_str()),
            Some("/snap/bin/multipass")
        );
        assert_eq!(
            config.map(|c| c.multipass.timeout),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_mistyped_field_is_an_error() {
        assert!(AppConfig::from_toml("[reconciler]\nmax_concurrent = \"many\"").is_err());
    }

    #[test]
    fn test_max_concurrent_env_value_parsing() {
        assert_eq!(parse_max_concurrent("16\n"), Some(16));
        assert_eq!(parse_max_concurrent("lots"), None);
        assert_eq!(parse_max_concurrent(""), None);
    }

    #[test]
    fn test_flag_overrides_file() {
        let config = AppConfig::default().with_max_concurrent(Some(2));
        assert_eq!(config.reconciler.max_concurrent, 2);

        let unchanged = AppConfig::default().with_max_concurrent(None);
        assert_eq!(unchanged.reconciler.max_concurrent, 4);
    }
}
