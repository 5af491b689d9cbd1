//! Configuration for the invite guard.
//!
//! Settings come from `invite-guard.json` in the working directory, or a file
//! given explicitly. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "invite-guard.json";

/// Default location of the persisted lockout state.
fn default_store_file() -> String {
    ".invite-guard/state.json".to_string()
}

/// Default location of the invite registry.
fn default_invites_file() -> String {
    "invites.json".to_string()
}

/// Default countdown tick period in milliseconds.
const fn default_tick_millis() -> u64 {
    1000
}

/// Invite guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the JSON file backing the lockout store.
    #[serde(default = "default_store_file")]
    pub store_file: String,

    /// Path to the JSON array of issued invites.
    #[serde(default = "default_invites_file")]
    pub invites_file: String,

    /// Countdown tick period in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
            invites_file: default_invites_file(),
            tick_millis: default_tick_millis(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `invite-guard.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            GuardError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `invite-guard.json` from `dir`, or defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::ConfigParseError` if the file cannot be read or is
    /// not valid JSON, and `GuardError::ConfigValidationError` if a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(GuardError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GuardError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::ConfigValidationError` if a path is empty or the
    /// tick period is zero.
    pub fn validate(&self) -> Result<()> {
        if self.tick_millis == 0 {
            return Err(GuardError::config_validation(
                "tickMillis must be greater than 0",
                "Set tickMillis to at least 1 in your invite-guard.json (1000 ticks once per second)",
            ));
        }

        if self.store_file.trim().is_empty() {
            return Err(GuardError::config_validation(
                "storeFile must not be empty",
                "Provide a path for the lockout state in your invite-guard.json",
            ));
        }

        if self.invites_file.trim().is_empty() {
            return Err(GuardError::config_validation(
                "invitesFile must not be empty",
                "Provide the path of the invite registry in your invite-guard.json",
            ));
        }

        Ok(())
    }

    /// Store path, resolved against `base` when relative.
    #[must_use]
    pub fn store_path(&self, base: &Path) -> PathBuf {
        base.join(&self.store_file)
    }

    /// Registry path, resolved against `base` when relative.
    #[must_use]
    pub fn invites_path(&self, base: &Path) -> PathBuf {
        base.join(&self.invites_file)
    }

    /// Countdown tick period.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}
