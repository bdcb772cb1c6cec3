//! Log output for applications embedding the crate.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the host, which may call [`init`] once at startup.

use crate::config::CoreConfig;
use crate::error::{BoardwiseError, Result};
use tracing_subscriber::EnvFilter;

/// Builds the filter, preferring `RUST_LOG` when it is set and valid
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs a global fmt subscriber using `filter` as the default directive
///
/// Fails if a global subscriber is already installed.
pub fn init(filter: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(true)
        .try_init()
        .map_err(|error| BoardwiseError::ConfigError(format!("logging: {}", error)))
}

/// Installs the subscriber described by `config`
pub fn init_from_config(config: &CoreConfig) -> Result<()> {
    init(&config.log_filter)
}
