//! Configuration for the coordination client.
//!
//! Loaded from a TOML file when one is given (or a `cairn.toml` in the
//! working directory), otherwise defaults. The database lands in the
//! platform data directory unless configured explicitly.

use std::path::{Path, PathBuf};

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "cairn.toml";

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the shared `SQLite` database.
    pub database_path: PathBuf,
    /// Lease validity window in seconds. A lease with no heartbeat for
    /// longer than this is reclaimable.
    pub lease_window_secs: i64,
    /// How far back the check-in help scan looks, in seconds.
    pub help_scan_window_secs: i64,
    /// How far back session bootstrap looks for open help requests,
    /// in seconds.
    pub help_window_secs: i64,
    /// Path of the shared message board file.
    pub board_path: PathBuf,
    /// Directory holding per-agent task queue files.
    pub queue_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            lease_window_secs: 600,
            help_scan_window_secs: 3600,
            help_window_secs: 86_400,
            board_path: PathBuf::from("TEAM_BOARD.md"),
            queue_dir: PathBuf::from("work_queues"),
        }
    }
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "cairn").map_or_else(
        || PathBuf::from(".cairn/cairn.db"),
        |dirs| dirs.data_dir().join("cairn.db"),
    )
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit path the file must exist and parse. With `None`, a
    /// `cairn.toml` in the working directory is used when present,
    /// defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new(CONFIG_FILE);
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Reject configurations that would make leases meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.lease_window_secs <= 0 {
            return Err(Error::InvalidConfig(
                "lease_window_secs must be positive".into(),
            ));
        }
        if self.help_scan_window_secs <= 0 || self.help_window_secs <= 0 {
            return Err(Error::InvalidConfig(
                "help windows must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Lease validity window.
    #[must_use]
    pub fn lease_window(&self) -> Duration {
        Duration::seconds(self.lease_window_secs)
    }

    /// Check-in help scan window.
    #[must_use]
    pub fn help_scan_window(&self) -> Duration {
        Duration::seconds(self.help_scan_window_secs)
    }

    /// Bootstrap help lookback window.
    #[must_use]
    pub fn help_window(&self) -> Duration {
        Duration::seconds(self.help_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        Config::default().validate()
    }

    #[test]
    fn test_load_from_file_overrides_defaults() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
        let path = dir.path().join("cairn.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/test-cairn.db\"\nlease_window_secs = 120\n",
        )
        .map_err(|e| Error::IoError(e.to_string()))?;

        let config = Config::load(Some(&path))?;
        assert_eq!(config.database_path, PathBuf::from("/tmp/test-cairn.db"));
        assert_eq!(config.lease_window_secs, 120);
        // Untouched fields keep their defaults
        assert_eq!(config.help_window_secs, 86_400);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/cairn.toml")));
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn test_non_positive_window_is_rejected() {
        let config = Config {
            lease_window_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
