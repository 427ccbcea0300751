//! Telegram transport.
//!
//! Outbound sends go through the Bot API `sendMessage`. Inbound updates are
//! long-polled with `getUpdates`, tracking the offset so each update is
//! handled once.

use super::ChatTransport;
use crate::error::TransportError;
use crate::handlers::CommandRouter;
use crate::state::SubscriberId;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, Recipient, Update, UpdateKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bot API limit for one text message.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Long-poll duration handed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 10;

/// Pause after a failed poll before retrying.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bound on the final offset confirmation at shutdown.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TelegramTransport {
    bot: Bot,
    username: OnceLock<String>,
}

impl TelegramTransport {
    pub fn new(token: &SecretString) -> Self {
        Self {
            bot: Bot::new(token.expose_secret()),
            username: OnceLock::new(),
        }
    }

    /// Long-poll one batch of updates starting at `offset`.
    async fn fetch(&self, offset: Option<i32>) -> Result<Vec<Update>, teloxide::RequestError> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message]);
        if let Some(offset) = offset {
            request = request.offset(offset);
        }
        request.await
    }

    /// Route every text message of a fetched batch and return the next offset.
    ///
    /// Runs to completion once started; a batch is never abandoned halfway.
    async fn route_batch(
        &self,
        router: &CommandRouter,
        updates: Vec<Update>,
        offset: Option<i32>,
    ) -> Option<i32> {
        let mut next = offset;
        for update in updates {
            next = next_offset(next, update.id.0);

            if let UpdateKind::Message(message) = update.kind
                && let Some(text) = message.text()
            {
                let sender = SubscriberId::from(message.chat.id.0);
                if let Some(reply) = router.route_text(&sender, text).await
                    && let Err(e) = self.bot.send_message(message.chat.id, reply).await
                {
                    warn!(sender = %sender, error = %e, "Failed to send command reply");
                }
            }
        }
        next
    }

    /// Confirm every update below `offset` so the next start does not see
    /// them again.
    async fn acknowledge(&self, offset: i32) {
        let request = self
            .bot
            .get_updates()
            .offset(offset)
            .limit(1)
            .timeout(0)
            .allowed_updates(vec![AllowedUpdate::Message]);
        match tokio::time::timeout(ACK_TIMEOUT, request).await {
            Ok(Ok(_)) => debug!(offset, "Acknowledged handled updates"),
            Ok(Err(e)) => warn!(offset, error = %e, "Failed to acknowledge handled updates"),
            Err(_) => warn!(offset, "Timed out acknowledging handled updates"),
        }
    }
}

/// Offset after `update_id`, keeping `current` if the id does not fit.
fn next_offset(current: Option<i32>, update_id: u32) -> Option<i32> {
    i32::try_from(update_id)
        .ok()
        .map(|id| id.saturating_add(1))
        .or(current)
}

/// Map a subscriber identity onto a Bot API recipient: numeric chat ids or
/// `@channel` usernames.
fn recipient_for(id: &SubscriberId) -> Result<Recipient, TransportError> {
    let raw = id.as_str();
    if let Ok(chat) = raw.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(chat)));
    }
    if raw.len() > 1 && raw.starts_with('@') {
        return Ok(Recipient::ChannelUsername(raw.to_owned()));
    }
    Err(TransportError::InvalidRecipient(raw.to_owned()))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn max_message_chars(&self) -> usize {
        MAX_MESSAGE_CHARS
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(
            username = me.username.as_deref().unwrap_or("unknown"),
            id = %me.id,
            "Telegram bot authenticated"
        );
        if let Some(username) = me.username.clone() {
            let _ = self.username.set(username);
        }
        Ok(())
    }

    fn bot_username(&self) -> Option<String> {
        self.username.get().cloned()
    }

    async fn send_text(&self, to: &SubscriberId, text: &str) -> Result<(), TransportError> {
        let recipient = recipient_for(to)?;
        self.bot
            .send_message(recipient, text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::SendFailed {
                recipient: to.to_string(),
                reason: e.to_string(),
            })
    }

    async fn run_receive_loop(
        &self,
        router: Arc<CommandRouter>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        info!("Telegram receive loop started");
        let mut offset = None;
        let mut unacknowledged = false;
        loop {
            // Shutdown is only observed while waiting on Telegram; a fetched
            // batch is always routed in full.
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.fetch(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    unacknowledged = !updates.is_empty();
                    offset = self.route_batch(&router, updates, offset).await;
                }
                Err(e) => {
                    debug!(error = %e, "Telegram poll failed, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }

        if unacknowledged && let Some(offset) = offset {
            self.acknowledge(offset).await;
        }
        info!("Telegram receive loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_become_chat_ids() {
        let recipient = recipient_for(&SubscriberId::from(-100123)).unwrap();
        assert_eq!(recipient, Recipient::Id(ChatId(-100123)));
    }

    #[test]
    fn channel_usernames_pass_through() {
        let recipient = recipient_for(&SubscriberId::from("@relay_news")).unwrap();
        assert_eq!(
            recipient,
            Recipient::ChannelUsername("@relay_news".to_owned())
        );
    }

    #[test]
    fn other_identities_are_rejected() {
        for raw in ["", "@", "alice"] {
            let err = recipient_for(&SubscriberId::from(raw)).unwrap_err();
            assert_eq!(err.error_code(), "invalid_recipient");
        }
    }

    #[test]
    fn offset_follows_last_update() {
        assert_eq!(next_offset(None, 41), Some(42));
        assert_eq!(next_offset(Some(10), 41), Some(42));
        assert_eq!(next_offset(Some(10), u32::MAX), Some(10));
    }

    #[test]
    fn username_unknown_before_connect() {
        use secrecy::Secret;

        let transport = TelegramTransport::new(&Secret::new("1:invalid".to_owned()));
        assert_eq!(transport.bot_username(), None);
    }

    #[tokio::test]
    async fn receive_loop_stops_when_already_cancelled() {
        use crate::db::MemoryStore;
        use crate::state::SubscriberRegistry;
        use secrecy::Secret;

        let transport = TelegramTransport::new(&Secret::new("1:invalid".to_owned()));
        let registry = Arc::new(SubscriberRegistry::new(Arc::new(MemoryStore::new()), Vec::new()));
        let router = Arc::new(CommandRouter::new(registry, &Secret::new("word".to_owned())));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        transport.run_receive_loop(router, shutdown).await.unwrap();
    }
}
