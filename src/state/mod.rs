//! Shared relay state.
//!
//! - [`SubscriberId`]: opaque chat destination handle
//! - [`SubscriberRegistry`]: concurrent in-memory subscriber set backed by the store

mod registry;
mod subscriber;

pub use registry::{AddOutcome, SubscriberRegistry};
pub use subscriber::SubscriberId;
