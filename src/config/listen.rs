//! Ingress listener configuration.

use serde::Deserialize;
use std::time::Duration;

/// Ingress listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Host or address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long a single accept waits before the loop re-checks for shutdown.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// Upper bound on reading one message from a sender.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Bytes read past this limit are discarded with the connection.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl ListenConfig {
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            accept_poll_ms: default_accept_poll_ms(),
            read_timeout_secs: default_read_timeout_secs(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    16001
}

fn default_accept_poll_ms() -> u64 {
    1000
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_max_message_bytes() -> usize {
    16 * 1024
}
