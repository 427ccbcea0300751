//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level [`Config`] and TOML loading
//! - [`listen`]: Ingress listener configuration
//! - [`relay`]: Relay behaviour and Telegram credentials
//! - [`database`]: Subscriber store backend selection and connection parameters
//! - [`telemetry`]: Verbosity, log format and metrics endpoint
//! - [`validation`]: Startup validation

mod database;
mod listen;
mod relay;
mod telemetry;
mod types;
mod validation;

pub use database::{DatabaseConfig, StoreBackend};
pub use listen::ListenConfig;
pub use relay::{RelayConfig, TelegramConfig};
pub use telemetry::{TelemetryConfig, Verbosity};
pub use types::{Config, ConfigError};
pub use validation::{ValidationError, validate};
