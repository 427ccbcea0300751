//! Relay lifecycle: `Starting -> Running -> Stopping -> Stopped`.
//!
//! [`LifecycleController::start`] wires the relay together and returns a
//! [`Relay`] handle. [`Relay::wait_for_shutdown`] blocks until a shutdown is
//! requested (signal, console `q`, or [`ShutdownHandle::request_shutdown`])
//! and then tears everything down in order: shutdown notice, receive loop,
//! ingress listener.

use crate::config::{ListenConfig, RelayConfig};
use crate::db::SubscriberStore;
use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::handlers::CommandRouter;
use crate::network::IngressListener;
use crate::state::SubscriberRegistry;
use crate::transport::ChatTransport;
use anyhow::Context as _;
use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Cloneable trigger for an orderly shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a shutdown has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}

/// Builds and starts the relay.
pub struct LifecycleController {
    listen: ListenConfig,
    relay: RelayConfig,
    store: Arc<dyn SubscriberStore>,
    transport: Arc<dyn ChatTransport>,
    shutdown: ShutdownHandle,
    state_tx: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        listen: ListenConfig,
        relay: RelayConfig,
        store: Arc<dyn SubscriberStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Starting);
        Self {
            listen,
            relay,
            store,
            transport,
            shutdown: ShutdownHandle::new(),
            state_tx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Install signal handlers, start the relay and run it until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        install_signal_handlers(self.shutdown_handle());
        let relay = self.start().await?;
        relay.wait_for_shutdown().await;
        Ok(())
    }

    /// Load subscribers, connect the transport, start the ingress listener and
    /// the receive loop, then broadcast the startup notice.
    ///
    /// A transport that cannot connect or an ingress port that cannot be bound
    /// is fatal.
    pub async fn start(self) -> anyhow::Result<Relay> {
        info!("Relay starting");

        let registry = Arc::new(SubscriberRegistry::load(Arc::clone(&self.store)).await);
        if self.relay.print_subscribers {
            for id in registry.list_live() {
                info!(subscriber = %id, "Loaded subscriber");
            }
        }

        self.transport
            .connect()
            .await
            .with_context(|| format!("failed to connect {} transport", self.transport.name()))?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&self.transport),
            self.relay.send_timeout(),
            self.relay.max_concurrent_sends,
        ));
        let router = Arc::new(
            CommandRouter::new(Arc::clone(&registry), &self.relay.secret)
                .with_bot_username(self.transport.bot_username()),
        );

        let ingress = IngressListener::bind(&self.listen, Arc::clone(&dispatcher)).await?;
        let ingress_addr = ingress.local_addr()?;
        let ingress_stop = CancellationToken::new();
        let ingress_task = tokio::spawn(ingress.run(ingress_stop.clone()));

        let transport_stop = CancellationToken::new();
        let receive_task = {
            let transport = Arc::clone(&self.transport);
            let stop = transport_stop.clone();
            tokio::spawn(async move {
                let result = transport.run_receive_loop(router, stop).await;
                if let Err(ref e) = result {
                    error!(error = %e, "Receive loop failed");
                }
                result
            })
        };

        self.state_tx.send_replace(LifecycleState::Running);
        info!(ingress = %ingress_addr, subscribers = registry.len(), "Relay running");

        let report = dispatcher.broadcast(&self.relay.startup_notice).await;
        if report.failed > 0 {
            warn!(failed = report.failed, "Startup notice not delivered to every subscriber");
        }

        let stop_timeout = self.relay.stop_timeout();
        Ok(Relay {
            registry,
            dispatcher,
            ingress_addr,
            ingress_stop,
            ingress_task,
            transport_stop,
            receive_task,
            shutdown: self.shutdown,
            state_tx: self.state_tx,
            shutdown_notice: self.relay.shutdown_notice,
            stop_timeout,
        })
    }
}

/// A running relay.
pub struct Relay {
    registry: Arc<SubscriberRegistry>,
    dispatcher: Arc<Dispatcher>,
    ingress_addr: SocketAddr,
    ingress_stop: CancellationToken,
    ingress_task: JoinHandle<()>,
    transport_stop: CancellationToken,
    receive_task: JoinHandle<Result<(), TransportError>>,
    shutdown: ShutdownHandle,
    state_tx: watch::Sender<LifecycleState>,
    shutdown_notice: String,
    stop_timeout: Duration,
}

impl Relay {
    /// Address the ingress listener is bound to.
    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress_addr
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Wait for a shutdown request, then stop.
    pub async fn wait_for_shutdown(self) {
        self.shutdown.requested().await;
        self.stop().await;
    }

    /// Stop in order: shutdown notice, receive loop, ingress listener. Each
    /// step is bounded by the stop timeout.
    pub async fn stop(self) {
        self.state_tx.send_replace(LifecycleState::Stopping);
        info!("Relay stopping");

        match tokio::time::timeout(self.stop_timeout, self.dispatcher.broadcast(&self.shutdown_notice)).await {
            Ok(report) if report.failed > 0 => {
                warn!(failed = report.failed, "Shutdown notice not delivered to every subscriber");
            }
            Ok(_) => {}
            Err(_) => warn!(timeout = ?self.stop_timeout, "Shutdown notice timed out"),
        }

        self.transport_stop.cancel();
        join_bounded("receive loop", self.receive_task, self.stop_timeout).await;

        self.ingress_stop.cancel();
        join_bounded("ingress listener", self.ingress_task, self.stop_timeout).await;

        self.state_tx.send_replace(LifecycleState::Stopped);
        info!("Relay stopped");
    }
}

async fn join_bounded<T>(what: &'static str, mut task: JoinHandle<T>, limit: Duration) {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(_)) => debug!(task = what, "Task joined"),
        Ok(Err(e)) => error!(task = what, error = %e, "Task panicked or was cancelled"),
        Err(_) => {
            warn!(task = what, timeout = ?limit, "Task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Request shutdown on SIGINT or SIGTERM.
pub fn install_signal_handlers(handle: ShutdownHandle) {
    tokio::spawn(async move {
        wait_for_signal().await;
        handle.request_shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl-C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("SIGINT received");
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("SIGINT received"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl-C");
                term.recv().await;
                info!("SIGTERM received");
            }
        },
        _ = term.recv() => info!("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Request shutdown when the operator types `q` on stdin.
///
/// Runs on a plain thread; a blocked stdin read never holds up process exit.
pub fn spawn_console_listener(handle: ShutdownHandle) {
    let spawned = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if is_quit_command(&line) => {
                        info!("Shutdown requested from console");
                        handle.request_shutdown();
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Console read failed, console control disabled");
                        return;
                    }
                }
            }
            debug!("stdin closed, console control disabled");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start console listener");
    }
}

fn is_quit_command(line: &str) -> bool {
    line.trim() == "q"
}
