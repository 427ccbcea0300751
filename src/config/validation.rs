//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, StoreBackend};
use secrecy::ExposeSecret;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("telegram.token is required (pass it as the first argument or in the config file)")]
    MissingToken,
    #[error("relay.secret must not be empty")]
    EmptySecret,
    #[error("relay.secret must not contain whitespace")]
    SecretHasWhitespace,
    #[error("listen.host is required")]
    MissingListenHost,
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.telegram.token.expose_secret().trim().is_empty() {
        errors.push(ValidationError::MissingToken);
    }

    // The secret is baked into a command name, so it has to survive tokenizing.
    let secret = config.relay.secret.expose_secret();
    if secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    } else if secret.chars().any(char::is_whitespace) {
        errors.push(ValidationError::SecretHasWhitespace);
    }

    if config.listen.host.is_empty() {
        errors.push(ValidationError::MissingListenHost);
    }

    let positive = [
        ("listen.accept_poll_ms", config.listen.accept_poll_ms),
        ("listen.read_timeout_secs", config.listen.read_timeout_secs),
        ("listen.max_message_bytes", config.listen.max_message_bytes as u64),
        ("relay.send_timeout_secs", config.relay.send_timeout_secs),
        ("relay.max_concurrent_sends", config.relay.max_concurrent_sends as u64),
        ("relay.stop_timeout_secs", config.relay.stop_timeout_secs),
        ("database.acquire_timeout_secs", config.database.acquire_timeout_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(name));
        }
    }

    if config.database.backend == StoreBackend::Sqlite && config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(
                config.database.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
