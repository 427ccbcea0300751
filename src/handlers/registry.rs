//! Command handler registry and dispatch.
//!
//! The `CommandRouter` maps chat command names to handlers and keeps usage
//! counters. The registration command's name embeds the configured secret, so
//! a wrong secret is simply an unknown command.

use super::context::{Context, Handler, HandlerError};
use super::parse::parse_command;
use super::subscription::{ForgetHandler, RegisterHandler, StartHandler, UsersHandler};
use crate::state::{SubscriberId, SubscriberRegistry};
use crate::telemetry::CommandTimer;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, Level, debug, span};

/// Registry of chat command handlers.
pub struct CommandRouter {
    handlers: HashMap<String, Box<dyn Handler>>,
    /// Command usage counters keyed by handler label.
    command_counts: HashMap<&'static str, AtomicU64>,
    registry: Arc<SubscriberRegistry>,
    /// Username the bot is addressed by in group chats (`/cmd@username`).
    bot_username: Option<String>,
}

impl CommandRouter {
    /// Create a router with all handlers registered.
    pub fn new(registry: Arc<SubscriberRegistry>, secret: &SecretString) -> Self {
        let mut handlers: HashMap<String, Box<dyn Handler>> = HashMap::new();

        handlers.insert("start".to_owned(), Box::new(StartHandler));
        handlers.insert(
            format!("register:{}", secret.expose_secret()),
            Box::new(RegisterHandler),
        );
        handlers.insert("forget".to_owned(), Box::new(ForgetHandler));
        handlers.insert("users".to_owned(), Box::new(UsersHandler));

        let command_counts = handlers
            .values()
            .map(|h| (h.name(), AtomicU64::new(0)))
            .collect();

        Self {
            handlers,
            command_counts,
            registry,
            bot_username: None,
        }
    }

    /// Accept `/command@username` for this bot's username.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Get command usage statistics, most used first.
    pub fn command_stats(&self) -> Vec<(&'static str, u64)> {
        let mut stats: Vec<_> = self
            .command_counts
            .iter()
            .map(|(cmd, count)| (*cmd, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        stats
    }

    /// Route one inbound chat message. Returns the reply to send, if any.
    pub async fn route_text(&self, sender: &SubscriberId, text: &str) -> Option<String> {
        let command = parse_command(text, self.bot_username.as_deref())?;
        self.dispatch(sender, command).await
    }

    /// Dispatch a parsed command name to its handler.
    ///
    /// Unknown commands produce no reply.
    pub async fn dispatch(&self, sender: &SubscriberId, command: &str) -> Option<String> {
        let Some(handler) = self.handlers.get(command) else {
            // The attempted name may be a wrong guess at the secret.
            debug!(sender = %sender, "Ignoring unknown command");
            return None;
        };

        let name = handler.name();
        if let Some(counter) = self.command_counts.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let command_span = span!(
            Level::INFO,
            "relay.command",
            command = name,
            sender = %sender,
        );
        let _timer = CommandTimer::new(name);

        let ctx = Context {
            sender,
            registry: &self.registry,
        };

        match handler.handle(&ctx).instrument(command_span).await {
            Ok(reply) => reply,
            Err(e) => {
                record_error(name, &e);
                Some(e.to_reply())
            }
        }
    }
}

fn record_error(command: &'static str, err: &HandlerError) {
    crate::metrics::record_command_error(command, err.error_code());
    debug!(command, error = %err, "Command error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use secrecy::Secret;

    fn router(store: Arc<MemoryStore>) -> CommandRouter {
        let registry = Arc::new(SubscriberRegistry::new(store, Vec::new()));
        CommandRouter::new(registry, &Secret::new("hunter2".to_owned()))
    }

    fn id(raw: &str) -> SubscriberId {
        SubscriberId::from(raw)
    }

    #[tokio::test]
    async fn start_replies_to_anyone() {
        let router = router(Arc::new(MemoryStore::new()));
        let reply = router.route_text(&id("1"), "/start").await;
        assert_eq!(reply.as_deref(), Some("Just say the word..."));
    }

    #[tokio::test]
    async fn register_with_secret() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());

        let reply = router.route_text(&id("42"), "/register:hunter2").await;
        assert_eq!(reply.as_deref(), Some("You are added to the broadcast list."));
        assert_eq!(store.rows(), vec![id("42")]);
    }

    #[tokio::test]
    async fn wrong_secret_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());

        assert!(router.route_text(&id("42"), "/register:guess").await.is_none());
        assert!(router.route_text(&id("42"), "/register").await.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn register_failure_reports_code() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let router = router(store);

        let reply = router.route_text(&id("42"), "/register:hunter2").await;
        assert_eq!(
            reply.as_deref(),
            Some("Failed to add you to the broadcast list. Error code: 1")
        );
    }

    #[tokio::test]
    async fn forget_unregistered_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());

        assert!(router.route_text(&id("7"), "/forget").await.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn forget_registered() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());
        router.route_text(&id("7"), "/register:hunter2").await;

        let reply = router.route_text(&id("7"), "/forget").await;
        assert_eq!(reply.as_deref(), Some("You are deleted from the broadcast list."));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn users_lists_store_contents() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());
        router.route_text(&id("42"), "/register:hunter2").await;
        router.route_text(&id("7"), "/register:hunter2").await;

        let reply = router.route_text(&id("42"), "/users").await;
        assert_eq!(
            reply.as_deref(),
            Some("Current saved subscribers of the channel:\n 42\n 7\n")
        );
    }

    #[tokio::test]
    async fn users_requires_registration() {
        let router = router(Arc::new(MemoryStore::new()));
        assert!(router.route_text(&id("9"), "/users").await.is_none());
    }

    #[tokio::test]
    async fn unknown_and_plain_text_are_ignored() {
        let router = router(Arc::new(MemoryStore::new()));
        assert!(router.route_text(&id("1"), "/help").await.is_none());
        assert!(router.route_text(&id("1"), "hello there").await.is_none());
    }

    #[tokio::test]
    async fn addressed_commands_need_own_username() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone()).with_bot_username(Some("relay_bot".to_owned()));

        let reply = router.route_text(&id("42"), "/register:hunter2@Relay_Bot").await;
        assert_eq!(reply.as_deref(), Some("You are added to the broadcast list."));
        assert!(router.route_text(&id("42"), "/users@other_bot").await.is_none());
        assert_eq!(store.rows(), vec![id("42")]);
    }

    #[tokio::test]
    async fn stats_count_by_label() {
        let router = router(Arc::new(MemoryStore::new()));
        router.route_text(&id("1"), "/start").await;
        router.route_text(&id("1"), "/start").await;
        router.route_text(&id("1"), "/register:hunter2").await;

        assert_eq!(router.command_stats(), vec![("start", 2), ("register", 1)]);
    }
}
