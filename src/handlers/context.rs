//! Command handler context and core types.

use crate::db::StoreError;
use crate::state::{SubscriberId, SubscriberRegistry};
use async_trait::async_trait;
use thiserror::Error;

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// Chat identity the command came from.
    pub sender: &'a SubscriberId,
    /// Shared subscriber registry.
    pub registry: &'a SubscriberRegistry,
}

/// Errors that can occur during command handling.
///
/// Every variant becomes a chat reply carrying the store's numeric code.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("registration failed: {0}")]
    Register(#[source] StoreError),

    #[error("removal failed: {0}")]
    Forget(#[source] StoreError),

    #[error("listing failed: {0}")]
    Users(#[source] StoreError),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Register(e) | Self::Forget(e) | Self::Users(e) => e.error_code(),
        }
    }

    /// Convert to the reply sent back to the requesting user.
    pub fn to_reply(&self) -> String {
        match self {
            Self::Register(e) => format!(
                "Failed to add you to the broadcast list. Error code: {}",
                e.code()
            ),
            Self::Forget(e) => format!(
                "Failed to delete you from the broadcast list. Error code: {}",
                e.code()
            ),
            Self::Users(e) => format!(
                "Failed to load the broadcast list. Error code: {}",
                e.code()
            ),
        }
    }
}

/// `Ok(None)` means the command is silently ignored.
pub type HandlerResult = Result<Option<String>, HandlerError>;

/// A chat command handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Label used for spans and metrics. Never contains the secret.
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &Context<'_>) -> HandlerResult;
}
