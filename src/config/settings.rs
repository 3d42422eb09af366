use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Strings longer than this many chars are stored once and referenced when repeated.
pub const DEFAULT_LONG_STRING_THRESHOLD: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Snapshot configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Keep error stacks in snapshots (development builds)
    pub dev_mode: bool,
    /// Length above which repeated strings get their own cell
    pub long_string_threshold: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            long_string_threshold: DEFAULT_LONG_STRING_THRESHOLD,
        }
    }
}

/// TOML representation of the `[snapshot]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSnapshotConfig {
    pub dev_mode: Option<bool>,
    pub long_string_threshold: Option<usize>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Snapshot configuration
    pub snapshot: Option<TomlSnapshotConfig>,
}

impl SnapshotConfig {
    /// Load from `~/.statewire/config.toml`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        let config_file = config_path();
        if !config_file.exists() {
            return Self::default();
        }
        match Self::load_from(&config_file) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %config_file.display(),
                    error = %e,
                    "Ignoring unreadable config file"
                );
                Self::default()
            }
        }
    }

    /// Load from an explicit path; errors are reported to the caller.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Self::default();

        if let Some(snapshot) = toml_config.snapshot {
            if let Some(dev_mode) = snapshot.dev_mode {
                config.dev_mode = dev_mode;
            }
            if let Some(threshold) = snapshot.long_string_threshold {
                config.long_string_threshold = threshold;
            }
        }

        Ok(config)
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_long_string_threshold(mut self, threshold: usize) -> Self {
        self.long_string_threshold = threshold;
        self
    }
}
