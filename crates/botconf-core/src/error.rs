//! Error types for the configuration session manager.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::session::SessionState;
use crate::settings::ValueKind;

/// A shared error type for every core operation.
///
/// Schema and state errors are meant for the transport layer to turn into
/// user-facing messages. `Contention` is the only retryable variant and
/// `StoreCorruption` is fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum BotconfError {
    /// A live session already edits this (bot type, group) pair.
    #[error("Group {group_id} is already being configured for {bot_type} (session {token})")]
    AlreadyEditing {
        bot_type: String,
        group_id: i64,
        token: String,
    },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// The operation is not legal in the session's current state.
    #[error("Cannot {operation} session {token} while it is {state}")]
    InvalidState {
        token: String,
        state: SessionState,
        operation: &'static str,
    },

    /// The option path is not part of the bot type's schema.
    #[error("Unknown option '{path}' for bot type '{bot_type}'")]
    UnknownOption { bot_type: String, path: String },

    /// The new value's kind disagrees with the schema.
    #[error("Type mismatch at '{path}': expected {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// A raw value could not be parsed as the expected kind.
    #[error("Invalid {expected} value: '{raw}'")]
    InvalidValue { expected: ValueKind, raw: String },

    /// The session's TTL elapsed before it could be committed.
    #[error("Session {token} expired at {expired_at}")]
    StaleSession {
        token: String,
        expired_at: DateTime<Utc>,
    },

    /// A per-key lock could not be acquired in time. Retry with backoff.
    #[error("Timed out after {waited_ms}ms waiting for {resource}")]
    Contention { resource: String, waited_ms: u64 },

    /// Neither the primary nor the backup store could be loaded.
    #[error("Store corruption: {0}")]
    StoreCorruption(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotconfError {
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

    /// Creates an UnknownOption error
    pub fn unknown_option(bot_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnknownOption {
            bot_type: bot_type.into(),
            path: path.into(),
        }
    }

    /// Creates a Contention error
    pub fn contention(resource: impl Into<String>, waited_ms: u64) -> Self {
        Self::Contention {
            resource: resource.into(),
            waited_ms,
        }
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

    /// Only lock contention is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the error aborts startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreCorruption(_))
    }

    /// Schema violations raised by an edit action.
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownOption { .. } | Self::TypeMismatch { .. } | Self::InvalidValue { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for BotconfError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<toml::de::Error> for BotconfError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for BotconfError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, BotconfError>`.
pub type Result<T> = std::result::Result<T, BotconfError>;
