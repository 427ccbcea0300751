//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::database::DatabaseConfig;
use super::listen::ListenConfig;
use super::relay::{RelayConfig, TelegramConfig};
use super::telemetry::TelemetryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Relay configuration.
///
/// Every section is optional in the TOML file; missing values fall back to
/// the same defaults the daemon has always shipped with.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Ingress listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Telegram bot credentials.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Registration secret, notices and delivery tuning.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Subscriber store.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

pub(super) fn default_true() -> bool {
    true
}
