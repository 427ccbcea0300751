//! Broadcast fan-out.
//!
//! The [`Dispatcher`] takes one snapshot of the live subscriber set and sends
//! the same text to every identity in it. Deliveries are independent: one
//! failing or slow recipient never stops the others, and nobody is removed
//! from the registry because a send failed.

use crate::error::TransportError;
use crate::state::{SubscriberId, SubscriberRegistry};
use crate::telemetry::spans;
use crate::transport::ChatTransport;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// Outcome of one [`Dispatcher::broadcast`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Running totals across every broadcast since startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub broadcasts: u64,
    pub delivered: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
    transport: Arc<dyn ChatTransport>,
    send_timeout: Duration,
    max_concurrent_sends: usize,
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        transport: Arc<dyn ChatTransport>,
        send_timeout: Duration,
        max_concurrent_sends: usize,
    ) -> Self {
        Self {
            registry,
            transport,
            send_timeout,
            max_concurrent_sends: max_concurrent_sends.max(1),
            broadcasts: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Send `text` to every live subscriber.
    ///
    /// Empty text and text over the transport's length limit are rejected
    /// with a warning and no sends.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        // Counted before validation so callers can tell a rejected broadcast
        // has been handled.
        self.broadcasts.fetch_add(1, Ordering::Relaxed);

        if text.is_empty() {
            warn!("Broadcast message is empty, nothing sent");
            crate::metrics::record_broadcast(0);
            return BroadcastReport::default();
        }

        let limit = self.transport.max_message_chars();
        let length = text.chars().count();
        if length > limit {
            warn!(length, limit, "Broadcast message exceeds transport limit, nothing sent");
            crate::metrics::record_broadcast(0);
            return BroadcastReport::default();
        }

        let recipients = self.registry.list_live();
        let count = recipients.len();
        crate::metrics::record_broadcast(count);

        let span = spans::broadcast(count);
        async {
            let outcomes: Vec<Result<(), TransportError>> = stream::iter(recipients)
                .map(|id| async move { self.deliver(&id, text).await })
                .buffer_unordered(self.max_concurrent_sends)
                .collect()
                .await;

            let mut report = BroadcastReport {
                recipients: count,
                ..BroadcastReport::default()
            };
            for outcome in outcomes {
                match outcome {
                    Ok(()) => {
                        report.delivered += 1;
                        crate::metrics::record_delivery("ok");
                    }
                    Err(e) => {
                        report.failed += 1;
                        crate::metrics::record_delivery(e.error_code());
                        warn!(error = %e, "Delivery failed");
                    }
                }
            }

            self.delivered
                .fetch_add(report.delivered as u64, Ordering::Relaxed);
            self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);

            info!(
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn deliver(&self, id: &SubscriberId, text: &str) -> Result<(), TransportError> {
        match tokio::time::timeout(self.send_timeout, self.transport.send_text(id, text)).await {
            Ok(Ok(())) => {
                debug!(recipient = %id, "Delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout {
                recipient: id.to_string(),
                timeout: self.send_timeout,
            }),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
