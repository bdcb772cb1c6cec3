use crate::error::{BoardwiseError, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable that overrides [`CoreConfig::log_filter`]
pub const LOG_ENV: &str = "BOARDWISE_LOG";

/// Runtime configuration for the board service and its storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Project root that holds the `.boardwise` data directory
    pub storage_root: PathBuf,
    /// How long a reorder commit may take before it is rolled back
    pub commit_timeout_ms: u64,
    /// Buffered change events per subscriber
    pub event_capacity: usize,
    /// `tracing` filter directive, e.g. `info` or `boardwise_core=debug`
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            commit_timeout_ms: 5_000,
            event_capacity: 64,
            log_filter: "info".to_string(),
        }
    }
}

impl CoreConfig {
    pub const FILE_NAME: &'static str = "config.json";

    /// Loads configuration from a JSON file, falling back to defaults for
    /// missing fields or a missing file. [`LOG_ENV`] wins over the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str::<Self>(&contents).map_err(|err| {
                BoardwiseError::ConfigError(format!("{}: {}", path.display(), err))
            })?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Default location of the config file below a project root
    pub fn default_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root
            .as_ref()
            .join(".boardwise")
            .join(Self::FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.commit_timeout_ms == 0 {
            return Err(BoardwiseError::ConfigError(
                "commit_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(BoardwiseError::ConfigError(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }
}
