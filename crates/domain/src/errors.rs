//! Error types used throughout the engine
//!
//! Every public operation returns `Result<T>`; expected failure modes
//! (rejected callbacks, non-2xx token responses, canceled attempts) are
//! values, not panics. Refresh and discovery failures are recovered locally
//! by their callers and never reach the application through this type unless
//! the fallback also failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Grantwell
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthError {
    /// Missing or invalid client credentials, endpoints, or toggles.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// State mismatch, missing authorization code, rejected loopback request.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Non-2xx HTTP response from the authorization server.
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// Network or response-parsing failure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The attempt was canceled or timed out.
    #[error("Operation canceled: {message}")]
    Canceled { message: String },
}

impl AuthError {
    /// Configuration failure with the given message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Authentication failure with the given message.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication { message: message.into() }
    }

    /// Server failure carrying the HTTP status code.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Transport failure with the given message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Canceled attempt with the given message.
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::Canceled { message: message.into() }
    }

    /// Whether this error represents a canceled or timed-out attempt.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

/// Result type alias for Grantwell operations
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    //! Unit tests for domain::errors.
    use super::*;

    /// Validates `AuthError::server` behavior for the display formatting
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the rendered message carries the status code.
    /// - Ensures the rendered message carries the server detail.
    #[test]
    fn test_server_error_display() {
        let error = AuthError::server(503, "temporarily unavailable");

        let rendered = error.to_string();
        assert!(rendered.contains("503"));
        assert!(rendered.contains("temporarily unavailable"));
    }

    /// Validates `AuthError::canceled` behavior for the cancellation check
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `is_canceled()` is true for `Canceled`.
    /// - Ensures `is_canceled()` is false for other variants.
    #[test]
    fn test_is_canceled() {
        assert!(AuthError::canceled("timed out").is_canceled());
        assert!(!AuthError::transport("connection reset").is_canceled());
    }

    /// Validates the serde round trip for the tagged representation scenario.
    ///
    /// Assertions:
    /// - Confirms the serialized form carries a `type` tag.
    /// - Confirms deserialization restores the same variant and payload.
    #[test]
    fn test_serde_round_trip() {
        let error = AuthError::server(401, "invalid_client");

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"Server\""));

        let back: AuthError = serde_json::from_str(&json).unwrap();
        match back {
            AuthError::Server { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid_client");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
