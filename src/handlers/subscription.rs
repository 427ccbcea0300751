//! Subscription command handlers: START, REGISTER, FORGET, USERS.

use super::context::{Context, Handler, HandlerError, HandlerResult};
use async_trait::async_trait;
use std::fmt::Write as _;
use tracing::info;

const START_REPLY: &str = "Just say the word...";
const REGISTERED_REPLY: &str = "You are added to the broadcast list.";
const FORGOTTEN_REPLY: &str = "You are deleted from the broadcast list.";
const USERS_HEADER: &str = "Current saved subscribers of the channel:\n";

/// Handler for `/start`. Answers anyone.
pub struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    fn name(&self) -> &'static str {
        "start"
    }

    async fn handle(&self, ctx: &Context<'_>) -> HandlerResult {
        info!(sender = %ctx.sender, "Start requested");
        Ok(Some(START_REPLY.to_owned()))
    }
}

/// Handler for `/register:<secret>`.
///
/// Registering twice is not an error; the set is re-persisted and the same
/// confirmation is sent.
pub struct RegisterHandler;

#[async_trait]
impl Handler for RegisterHandler {
    fn name(&self) -> &'static str {
        "register"
    }

    async fn handle(&self, ctx: &Context<'_>) -> HandlerResult {
        ctx.registry
            .add(ctx.sender.clone())
            .await
            .map_err(HandlerError::Register)?;
        Ok(Some(REGISTERED_REPLY.to_owned()))
    }
}

/// Handler for `/forget`. Silent for identities that are not registered.
pub struct ForgetHandler;

#[async_trait]
impl Handler for ForgetHandler {
    fn name(&self) -> &'static str {
        "forget"
    }

    async fn handle(&self, ctx: &Context<'_>) -> HandlerResult {
        if !ctx.registry.contains(ctx.sender) {
            return Ok(None);
        }

        let removed = ctx
            .registry
            .remove(ctx.sender)
            .await
            .map_err(HandlerError::Forget)?;

        // A concurrent /forget may have won the race.
        Ok(removed.then(|| FORGOTTEN_REPLY.to_owned()))
    }
}

/// Handler for `/users`. Lists the store contents, not the in-memory set.
pub struct UsersHandler;

#[async_trait]
impl Handler for UsersHandler {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn handle(&self, ctx: &Context<'_>) -> HandlerResult {
        if !ctx.registry.contains(ctx.sender) {
            return Ok(None);
        }

        let ids = ctx
            .registry
            .list_persisted()
            .await
            .map_err(HandlerError::Users)?;

        let mut reply = String::from(USERS_HEADER);
        for id in &ids {
            let _ = writeln!(reply, " {id}");
        }
        Ok(Some(reply))
    }
}
