//! Integration test common infrastructure.
//!
//! Provides a recording chat transport and helpers for running an in-process
//! relay and talking to its ingress port.

pub mod relay;
pub mod transport;

#[allow(unused_imports)]
pub use relay::{SECRET, SHUTDOWN_NOTICE, STARTUP_NOTICE, send_ingress, start_relay, wait_until};
#[allow(unused_imports)]
pub use transport::{RecordingTransport, Sent};
