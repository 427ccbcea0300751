//! Subscriber store configuration.

use secrecy::{Secret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::types::default_true;

/// Which backend persists the subscriber set.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// PostgreSQL server (host/port/name/user/password).
    #[default]
    Postgres,
    /// SQLite file at `path` (or `:memory:`).
    Sqlite,
    /// Process-local set; nothing survives a restart.
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Database configuration.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: SecretString,
    /// Path to the SQLite database file.
    #[serde(default = "default_path")]
    pub path: String,
    /// Connection acquire timeout; bounds every store round-trip.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Apply embedded schema migrations at startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            host: default_host(),
            port: default_port(),
            name: default_name(),
            user: default_user(),
            password: default_password(),
            path: default_path(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            run_migrations: true,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "sender_bot".to_string()
}

fn default_user() -> String {
    "sender_bot".to_string()
}

fn default_password() -> SecretString {
    Secret::new("password".to_string())
}

fn default_path() -> String {
    "relayd.db".to_string()
}

fn default_acquire_timeout_secs() -> u64 {
    5
}
