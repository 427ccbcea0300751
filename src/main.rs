//! relayd - Relay Daemon
//!
//! Rebroadcasts messages written to a local socket to registered Telegram chats.

use clap::Parser;
use relayd::cli::Cli;
use relayd::lifecycle::{self, LifecycleController};
use relayd::transport::TelegramTransport;
use relayd::{config, db, http, metrics, telemetry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    telemetry::init(&config.telemetry)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("refusing to start with {} configuration error(s)", errors.len());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.listen.host,
        port = config.listen.port,
        store = config.database.backend.as_str(),
        "Starting relayd"
    );
    // Secrets print as [REDACTED].
    debug!(config = ?config, "Effective configuration");

    // Convention: metrics_port = 0 disables the HTTP endpoint.
    let metrics_stop = CancellationToken::new();
    let metrics_port = config.telemetry.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(http::run_http_server(metrics_port, metrics_stop.clone()));
    }

    let store = db::open_store(&config.database).await?;
    let transport = Arc::new(TelegramTransport::new(&config.telegram.token));

    let controller = LifecycleController::new(config.listen, config.relay, store, transport);
    lifecycle::spawn_console_listener(controller.shutdown_handle());

    let result = controller.run().await;
    metrics_stop.cancel();

    match &result {
        Ok(()) => info!("relayd terminated"),
        Err(e) => error!(error = %format_args!("{e:#}"), "relayd failed"),
    }
    result
}
