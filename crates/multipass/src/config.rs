//! Configuration for the multipass bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for [`crate::MultipassClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipassConfig {
    /// Path to the multipass CLI executable.
    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    /// Timeout for a single CLI call.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,

    /// Directory holding rendered cloud-init files (`<name>-<instance>`).
    #[serde(default = "default_cloud_init_dir")]
    pub cloud_init_dir: PathBuf,
}

impl Default for MultipassConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            timeout: default_timeout(),
            cloud_init_dir: default_cloud_init_dir(),
        }
    }
}

impl MultipassConfig {
    /// Create a new config with the given CLI path.
    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cloud-init directory.
    #[must_use]
    pub fn cloud_init_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cloud_init_dir = dir.into();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `MPFLEET_*` environment overrides on top of this config.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("MPFLEET_MULTIPASS_PATH") {
            self.cli_path = path;
        }

        if let Some(timeout) = std::env::var("MPFLEET_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| parse_timeout_secs(&raw))
        {
            self.timeout = timeout;
        }

        if let Ok(dir) = std::env::var("MPFLEET_CLOUD_INIT_DIR") {
            self.cloud_init_dir = PathBuf::from(dir);
        }

        self
    }
}

/// Parse a `MPFLEET_TIMEOUT_SECS` value; garbage is logged and ignored.
fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!(value = raw, error = %e, "Ignoring unparseable MPFLEET_TIMEOUT_SECS");
            None
        }
    }
}

fn default_cli_path() -> String {
    if let Ok(path) = which::which("multipass") {
        return path.to_string_lossy().to_string();
    }
    "multipass".to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(300) // launches pull images
}

fn default_cloud_init_dir() -> PathBuf {
    std::env::var_os("TEMP").map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_env_value_parsing() {
        assert_eq!(parse_timeout_secs(" 45 "), Some(Duration::from_secs(45)));
        assert_eq!(parse_timeout_secs("ninety"), None);
        assert_eq!(parse_timeout_secs("-1"), None);
    }

    #[test]
    fn test_default_config() {
        let config = MultipassConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.cli_path.contains("multipass"));
    }

    #[test]
    fn test_config_builder() {
        let config = MultipassConfig::with_cli_path("/snap/bin/multipass")
            .timeout(Duration::from_secs(60))
            .cloud_init_dir("/tmp/cloud-init");

        assert_eq!(config.cli_path, "/snap/bin/multipass");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.cloud_init_dir, PathBuf::from("/tmp/cloud-init"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let parsed: Result<MultipassConfig, _> =
            serde_json::from_str(r#"{"cli_path": "/usr/local/bin/multipass", "timeout": 45}"#);
        let config = parsed.ok();
        assert_eq!(
            config.as_ref().map(|c| c.timeout),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            config.map(|c| c.cli_path),
            Some("/usr/local/bin/multipass".to_string())
        );
    }
}
