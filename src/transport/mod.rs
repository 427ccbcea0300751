//! Chat transport abstraction.
//!
//! A transport delivers text to a subscriber and runs the inbound loop that
//! feeds chat commands to the [`CommandRouter`]. The relay core only sees the
//! [`ChatTransport`] trait; [`TelegramTransport`] is the production
//! implementation.

mod telegram;

pub use telegram::TelegramTransport;

use crate::error::TransportError;
use crate::handlers::CommandRouter;
use crate::state::SubscriberId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &'static str;

    /// Longest text, in characters, a single send may carry.
    fn max_message_chars(&self) -> usize;

    /// Verify credentials and connectivity.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Username commands may be addressed to, known after [`connect`].
    ///
    /// [`connect`]: ChatTransport::connect
    fn bot_username(&self) -> Option<String> {
        None
    }

    /// Deliver `text` to one subscriber.
    async fn send_text(&self, to: &SubscriberId, text: &str) -> Result<(), TransportError>;

    /// Receive inbound messages, route them, and reply, until `shutdown`
    /// is cancelled.
    async fn run_receive_loop(
        &self,
        router: Arc<CommandRouter>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError>;
}
