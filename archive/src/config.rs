//! Configuration management for the archive tool

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::ValidationError, types::BlockRange};

/// Default JSON-RPC address of a local node
pub const DEFAULT_REMOTE: &str = "http://127.0.0.1:26657";

/// Default output file of an export
pub const DEFAULT_OUTPUT_PATH: &str = "./backup.jsonl";

/// Export run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// First block to export (inclusive)
    pub from_block: u64,

    /// Last block to export (inclusive), latest when unset
    pub to_block: Option<u64>,

    /// Archive file the export writes to
    pub output_path: PathBuf,

    /// Replace an existing archive file
    pub overwrite: bool,

    /// Keep exporting new blocks after the historical range
    pub watch: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            from_block: 1,
            to_block: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            overwrite: false,
            watch: false,
        }
    }
}

impl ExportConfig {
    /// Requested block range
    pub fn range(&self) -> BlockRange {
        BlockRange::new(self.from_block, self.to_block)
    }

    /// Validate the configuration.
    ///
    /// The only storage access is an existence check on the output path.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.output_path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidOutputLocation);
        }

        if !self.overwrite && self.output_path.exists() {
            return Err(ValidationError::OutputAlreadyExists(self.output_path.clone()));
        }

        if let Some(to) = self.to_block {
            if !self.range().is_valid() {
                return Err(ValidationError::InvalidRange {
                    from: self.from_block,
                    to,
                });
            }
        }

        Ok(())
    }
}

/// Process-wide settings shared by both subcommands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// JSON-RPC URL of the node
    pub remote: String,

    /// Export watch polling interval in milliseconds
    pub watch_interval_ms: u64,

    /// Replay tail polling interval in milliseconds
    pub tail_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            watch_interval_ms: 1000,
            tail_interval_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl ArchiveSettings {
    /// Load settings from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `TX_ARCHIVE` prefix, e.g.
    /// `TX_ARCHIVE__REMOTE=http://node:26657`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("remote", defaults.remote)?
            .set_default("watch_interval_ms", defaults.watch_interval_ms as i64)?
            .set_default("tail_interval_ms", defaults.tail_interval_ms as i64)?
            .set_default("log_level", defaults.log_level)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                Environment::with_prefix("TX_ARCHIVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.remote).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid remote URL: {}",
                self.remote
            )));
        }

        if self.watch_interval_ms == 0 {
            return Err(ConfigError::Message("watch_interval_ms must be greater than 0".into()));
        }

        if self.tail_interval_ms == 0 {
            return Err(ConfigError::Message("tail_interval_ms must be greater than 0".into()));
        }

        Ok(())
    }

    /// Export watch polling interval
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Replay tail polling interval
    pub fn tail_interval(&self) -> Duration {
        Duration::from_millis(self.tail_interval_ms)
    }
}
