//! relayd - Relay Daemon
//!
//! Accepts raw text on a local TCP port and rebroadcasts it to every chat that
//! registered with the bot using the shared secret word.

pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod state;
pub mod telemetry;
pub mod transport;
