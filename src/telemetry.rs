//! Logging setup and telemetry utilities for command timing.

use crate::config::TelemetryConfig;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured verbosity is used.
pub fn init(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(config.verbosity.as_filter().into()));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    }
}

/// Guard for timing command execution and recording metrics.
///
/// Records command latency when dropped.
pub struct CommandTimer {
    command: &'static str,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(command: &'static str) -> Self {
        Self {
            command,
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(self.command, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Create a span for one ingress connection.
    pub fn ingress_connection(peer: SocketAddr) -> Span {
        info_span!("ingress.connection", peer = %peer)
    }

    /// Create a span for one broadcast.
    pub fn broadcast(recipients: usize) -> Span {
        info_span!("broadcast", recipients)
    }
}
