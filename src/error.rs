//! Unified error handling for relayd.
//!
//! Store errors live with the store in [`crate::db`]; this module holds the
//! errors of the two network edges, with static labels for metrics.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Transport Errors (chat delivery and receive loop)
// ============================================================================

/// Errors raised by a chat transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform rejected or failed a single delivery (blocked user,
    /// unknown chat, network error).
    #[error("send to {recipient} failed: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("send to {recipient} timed out after {timeout:?}")]
    Timeout { recipient: String, timeout: Duration },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Credentials or connectivity check failed at startup.
    #[error("transport connect failed: {0}")]
    Connect(String),

    #[error("transport receive loop failed: {0}")]
    Receive(String),
}

impl TransportError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SendFailed { .. } => "send_failed",
            Self::Timeout { .. } => "send_timeout",
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::Connect(_) => "connect_failed",
            Self::Receive(_) => "receive_failed",
        }
    }
}

// ============================================================================
// Ingress Errors (raw socket reads)
// ============================================================================

/// Errors that drop a single ingress connection.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("payload is not valid UTF-8: {0}")]
    DecodeFailed(#[from] std::str::Utf8Error),

    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl IngressError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DecodeFailed(_) => "decode_failed",
            Self::Read(_) => "read_error",
            Self::Timeout(_) => "read_timeout",
            Self::TooLarge { .. } => "too_large",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_labels_are_stable() {
        let err = TransportError::SendFailed {
            recipient: "42".into(),
            reason: "Forbidden: bot was blocked by the user".into(),
        };
        assert_eq!(err.error_code(), "send_failed");
        assert!(err.to_string().contains("42"));
        assert_eq!(
            TransportError::InvalidRecipient("".into()).error_code(),
            "invalid_recipient"
        );
    }

    #[test]
    fn ingress_decode_error_converts() {
        let bytes = [0xffu8, 0xfe];
        let err: IngressError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert_eq!(err.error_code(), "decode_failed");
    }
}
