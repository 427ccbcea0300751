//! Relay behaviour and chat credentials.

use secrecy::{Secret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::types::default_true;

/// Telegram bot credentials.
#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token issued by @BotFather.
    #[serde(default = "empty_secret")]
    pub token: SecretString,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: empty_secret(),
        }
    }
}

/// Registration secret, lifecycle notices and delivery tuning.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// Secret word completing `/register:<secret>`.
    #[serde(default = "default_secret")]
    pub secret: SecretString,
    /// Broadcast to every subscriber once the relay is running.
    #[serde(default = "default_startup_notice")]
    pub startup_notice: String,
    /// Broadcast to every subscriber when the relay stops.
    #[serde(default = "default_shutdown_notice")]
    pub shutdown_notice: String,
    /// Upper bound on a single per-recipient send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Number of recipients contacted in parallel during a broadcast.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Upper bound on joining each background loop during shutdown.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    /// Log the loaded subscriber list at startup.
    #[serde(default = "default_true")]
    pub print_subscribers: bool,
}

impl RelayConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            startup_notice: default_startup_notice(),
            shutdown_notice: default_shutdown_notice(),
            send_timeout_secs: default_send_timeout_secs(),
            max_concurrent_sends: default_max_concurrent_sends(),
            stop_timeout_secs: default_stop_timeout_secs(),
            print_subscribers: true,
        }
    }
}

fn empty_secret() -> SecretString {
    Secret::new(String::new())
}

fn default_secret() -> SecretString {
    Secret::new("password".to_string())
}

fn default_startup_notice() -> String {
    "Bot is up and running!".to_string()
}

fn default_shutdown_notice() -> String {
    "The bot is terminated!".to_string()
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_sends() -> usize {
    8
}

fn default_stop_timeout_secs() -> u64 {
    10
}
