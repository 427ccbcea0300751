//! In-process relay instances for integration testing.

use super::transport::RecordingTransport;
use relayd::config::{ListenConfig, RelayConfig};
use relayd::db::SubscriberStore;
use relayd::lifecycle::{LifecycleController, Relay};
use secrecy::Secret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub const SECRET: &str = "opensesame";
pub const STARTUP_NOTICE: &str = "Bot is up and running!";
pub const SHUTDOWN_NOTICE: &str = "The bot is terminated!";

fn listen_config() -> ListenConfig {
    ListenConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        accept_poll_ms: 50,
        read_timeout_secs: 2,
        ..ListenConfig::default()
    }
}

fn relay_config() -> RelayConfig {
    RelayConfig {
        secret: Secret::new(SECRET.to_owned()),
        send_timeout_secs: 1,
        stop_timeout_secs: 2,
        print_subscribers: false,
        ..RelayConfig::default()
    }
}

#[allow(dead_code)]
pub fn controller(
    store: Arc<dyn SubscriberStore>,
    transport: Arc<RecordingTransport>,
) -> LifecycleController {
    LifecycleController::new(listen_config(), relay_config(), store, transport)
}

/// Start a relay on an ephemeral ingress port.
pub async fn start_relay(
    store: Arc<dyn SubscriberStore>,
    transport: Arc<RecordingTransport>,
) -> Relay {
    controller(store, transport)
        .start()
        .await
        .expect("relay failed to start")
}

/// Write one ingress message and close the connection.
#[allow(dead_code)]
pub async fn send_ingress(addr: SocketAddr, payload: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.expect("ingress connect");
    stream.write_all(payload).await.expect("ingress write");
    stream.shutdown().await.expect("ingress shutdown");
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
