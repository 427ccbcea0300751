//! Command-line interface.
//!
//! Flags override the TOML file, which overrides built-in defaults.

use crate::config::{Config, ConfigError, StoreBackend, Verbosity};
use clap::Parser;
use secrecy::Secret;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "relayd", version)]
#[command(about = "Relay messages from a local TCP port to subscribed Telegram chats", long_about = None)]
pub struct Cli {
    /// Telegram bot token.
    #[arg(env = "RELAYD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// TOML configuration file.
    #[arg(short, long, value_name = "PATH", env = "RELAYD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ingress listen host.
    #[arg(long)]
    pub host: Option<String>,

    /// Ingress listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Secret word for `/register:<secret>`.
    #[arg(long, value_name = "WORD")]
    pub secret: Option<String>,

    /// Subscriber store backend (postgres, sqlite, memory).
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend)]
    pub store: Option<StoreBackend>,

    #[arg(long = "db-host", alias = "db_host", value_name = "HOST")]
    pub db_host: Option<String>,

    #[arg(long = "db-port", alias = "db_port", value_name = "PORT")]
    pub db_port: Option<u16>,

    #[arg(long = "db-name", alias = "db_name", value_name = "NAME")]
    pub db_name: Option<String>,

    #[arg(long = "db-user", alias = "db_user", value_name = "USER")]
    pub db_user: Option<String>,

    #[arg(long = "db-pass", alias = "db_pass", value_name = "PASSWORD", env = "RELAYD_DB_PASS", hide_env_values = true)]
    pub db_pass: Option<String>,

    /// SQLite database path.
    #[arg(long = "db-path", value_name = "PATH")]
    pub db_path: Option<String>,

    /// Log verbosity: none, error, warning, info, debug, or 0-4.
    #[arg(long, value_name = "LEVEL")]
    pub verbose: Option<Verbosity>,
}

fn parse_backend(raw: &str) -> Result<StoreBackend, String> {
    match raw.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "sqlite" => Ok(StoreBackend::Sqlite),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(format!("unknown store backend `{other}`")),
    }
}

impl Cli {
    /// Load the config file (or defaults) and apply flag overrides.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(token) = &self.token {
            config.telegram.token = Secret::new(token.clone());
        }
        if let Some(host) = &self.host {
            config.listen.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(secret) = &self.secret {
            config.relay.secret = Secret::new(secret.clone());
        }
        if let Some(backend) = self.store {
            config.database.backend = backend;
        }
        if let Some(host) = &self.db_host {
            config.database.host = host.clone();
        }
        if let Some(port) = self.db_port {
            config.database.port = port;
        }
        if let Some(name) = &self.db_name {
            config.database.name = name.clone();
        }
        if let Some(user) = &self.db_user {
            config.database.user = user.clone();
        }
        if let Some(pass) = &self.db_pass {
            config.database.password = Secret::new(pass.clone());
        }
        if let Some(path) = &self.db_path {
            config.database.path = path.clone();
        }
        if let Some(verbosity) = self.verbose {
            config.telemetry.verbosity = verbosity;
        }
    }
}
