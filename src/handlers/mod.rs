//! Chat command handlers.
//!
//! This module contains the Handler trait and the command router that maps
//! inbound chat commands to subscription operations.

mod context;
mod parse;
mod registry;
mod subscription;

pub use context::{Context, Handler, HandlerError, HandlerResult};
pub use parse::parse_command;
pub use registry::CommandRouter;
pub use subscription::{ForgetHandler, RegisterHandler, StartHandler, UsersHandler};
