//! Error types for the Arbor sync engine.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the Arbor crates.
///
/// Only locally invoked API misuse (for example generating a message without a
/// destination) is meant to reach a caller. Failures met while processing the
/// change channel are logged and contained by the channel code.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ArborError {
    /// A message was generated without a valid destination container.
    #[error("Conversation or channel missing: a message needs a destination container")]
    ContainerMissing,

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Part body or entity payload could not be decoded
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Binary content could not be uploaded before building a part
    #[error("Upload error: {0}")]
    Upload(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArborError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a MalformedPayload error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Creates an Upload error
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a ContainerMissing error
    pub fn is_container_missing(&self) -> bool {
        matches!(self, Self::ContainerMissing)
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a malformed payload error
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ArborError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ArborError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ArborError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for ArborError {
    fn from(err: base64::DecodeError) -> Self {
        Self::MalformedPayload {
            message: format!("invalid base64 body: {}", err),
        }
    }
}

/// A type alias for `Result<T, ArborError>`.
pub type Result<T> = std::result::Result<T, ArborError>;
