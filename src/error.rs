//! Error types for StreamChat
//!
//! This module defines the error taxonomy used by the controller, the
//! stream session, the persistence client and the CLI, using `thiserror`
//! for ergonomic error handling.

use thiserror::Error;

/// Main error type for StreamChat operations
///
/// Transport, decode and server failures that happen *inside* an exchange
/// are normally folded into a `Failed` stream event instead of being
/// returned; these variants exist for the call sites that open connections
/// or talk to the persistence service directly.
#[derive(Error, Debug)]
pub enum StreamChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be opened or was dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Event payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Explicit error reported by the server
    #[error("Server error [{code}]: {message}")]
    Server {
        /// Machine-readable error code
        code: String,
        /// Human-readable message
        message: String,
    },

    /// Command rejected at the command boundary; state is unchanged
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence service reported a failure
    #[error("API error: {0}")]
    Api(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The controller task is gone
    #[error("Controller unavailable: {0}")]
    ControllerClosed(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StreamChatError {
    /// Returns true when the error is a command-boundary rejection
    pub fn is_validation(&self) -> bool {
        matches!(self, StreamChatError::Validation(_))
    }
}

/// Result type alias for StreamChat operations
///
/// Uses `anyhow::Error` so context can be attached freely; callers that need
/// to branch on the kind use `downcast_ref::<StreamChatError>()`.
pub type Result<T> = anyhow::Result<T>;

/// Returns true if `err` wraps a [`StreamChatError::Validation`]
pub fn is_validation_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StreamChatError>()
        .map(StreamChatError::is_validation)
        .unwrap_or(false)
}

/// Extracts a readable reason from an error response body
///
/// The service answers failures with `{"detail": ...}`; anything else is
/// returned trimmed, and an empty body yields `"no details"`.
pub fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
        if let Some(serde_json::Value::String(message)) = value.get("message") {
            return message.clone();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details".to_string()
    } else {
        trimmed.to_string()
    }
}
