//! Ingress - raw TCP listener that turns each connection into a broadcast.
//!
//! A connection carries exactly one message: every byte the peer writes
//! before closing its side. Nothing is written back.

use crate::config::ListenConfig;
use crate::dispatch::Dispatcher;
use crate::error::IngressError;
use crate::telemetry::spans;
use anyhow::Context as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, instrument, warn};

const LISTEN_BACKLOG: u32 = 1024;

/// Accepts ingress connections and hands each message to the [`Dispatcher`].
pub struct IngressListener {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    accept_poll: Duration,
    read_timeout: Duration,
    max_message_bytes: usize,
}

impl IngressListener {
    /// Bind the listener with `SO_REUSEADDR` so a restart can reclaim the port
    /// while old connections sit in `TIME_WAIT`.
    pub async fn bind(config: &ListenConfig, dispatcher: Arc<Dispatcher>) -> anyhow::Result<Self> {
        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?
            .next()
            .with_context(|| format!("{} resolved to no addresses", config.host))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind ingress listener on {addr}"))?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        info!(address = %listener.local_addr()?, "Ingress listener bound");

        Ok(Self {
            listener,
            dispatcher,
            accept_poll: config.accept_poll(),
            read_timeout: config.read_timeout(),
            max_message_bytes: config.max_message_bytes,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled, then close the socket
    /// and wait (bounded by the read timeout) for in-flight connections.
    #[instrument(skip_all, name = "ingress")]
    pub async fn run(self, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = tokio::time::timeout(self.accept_poll, self.listener.accept()) => {
                    match accepted {
                        // Poll tick with no connection; loop to re-check shutdown.
                        Err(_) => continue,
                        Ok(Ok((stream, addr))) => {
                            debug!(%addr, "Ingress connection accepted");
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let read_timeout = self.read_timeout;
                            let limit = self.max_message_bytes;
                            tracker.spawn(
                                handle_connection(stream, dispatcher, read_timeout, limit)
                                    .instrument(spans::ingress_connection(addr)),
                            );
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "Failed to accept ingress connection");
                        }
                    }
                }
            }
        }

        drop(self.listener);
        tracker.close();
        if tokio::time::timeout(self.read_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(in_flight = tracker.len(), "Ingress connections still running at stop");
        }
        info!("Ingress listener stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    read_timeout: Duration,
    limit: usize,
) {
    match read_message(stream, read_timeout, limit).await {
        Ok(text) => {
            crate::metrics::record_ingress("ok");
            info!(bytes = text.len(), "Message received for broadcast");
            debug!(message = %text);
            dispatcher.broadcast(&text).await;
        }
        Err(e) => {
            crate::metrics::record_ingress(e.error_code());
            warn!(error = %e, "Dropping ingress connection");
        }
    }
}

/// Read until EOF, trim surrounding ASCII whitespace and decode as UTF-8.
async fn read_message<R>(reader: R, read_timeout: Duration, limit: usize) -> Result<String, IngressError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = reader.take(limit as u64 + 1);

    tokio::time::timeout(read_timeout, limited.read_to_end(&mut buf))
        .await
        .map_err(|_| IngressError::Timeout(read_timeout))??;

    if buf.len() > limit {
        return Err(IngressError::TooLarge { limit });
    }

    let text = std::str::from_utf8(buf.trim_ascii())?;
    Ok(text.to_owned())
}
