//! Recording chat transport.
//!
//! Captures every send, can be told to fail for specific recipients, and lets
//! tests inject inbound chat messages that flow through the real router.

use async_trait::async_trait;
use parking_lot::Mutex;
use relayd::error::TransportError;
use relayd::handlers::CommandRouter;
use relayd::state::SubscriberId;
use relayd::transport::ChatTransport;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub to: SubscriberId,
    pub text: String,
}

impl Sent {
    pub fn new(to: &str, text: &str) -> Self {
        Self {
            to: SubscriberId::from(to),
            text: text.to_owned(),
        }
    }
}

pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<SubscriberId>>,
    connect_fails: AtomicBool,
    inbound_tx: mpsc::UnboundedSender<(SubscriberId, String)>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(SubscriberId, String)>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            connect_fails: AtomicBool::new(false),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }

    /// Sends to `id` are recorded and then fail.
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().insert(SubscriberId::from(id));
    }

    pub fn fail_connect(&self) {
        self.connect_fails.store(true, Ordering::SeqCst);
    }

    /// Deliver an inbound chat message as if `sender` had typed it.
    pub fn inject(&self, sender: &str, text: &str) {
        let _ = self
            .inbound_tx
            .send((SubscriberId::from(sender), text.to_owned()));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn max_message_chars(&self) -> usize {
        4096
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.connect_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("Unauthorized".into()));
        }
        Ok(())
    }

    async fn send_text(&self, to: &SubscriberId, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push(Sent {
            to: to.clone(),
            text: text.to_owned(),
        });
        if self.failing.lock().contains(to) {
            return Err(TransportError::SendFailed {
                recipient: to.to_string(),
                reason: "Forbidden: bot was blocked by the user".into(),
            });
        }
        Ok(())
    }

    async fn run_receive_loop(
        &self,
        router: Arc<CommandRouter>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let mut inbound = self.inbound_rx.lock().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                message = inbound.recv() => {
                    let Some((sender, text)) = message else {
                        return Ok(());
                    };
                    if let Some(reply) = router.route_text(&sender, &text).await {
                        let _ = self.send_text(&sender, &reply).await;
                    }
                }
            }
        }
    }
}
