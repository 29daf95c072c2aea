//! Error types for Kestrel Core

use thiserror::Error;

/// Result type alias using Kestrel Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Kestrel record engine
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from storage operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors (configuration files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage-related errors (out-of-range slots, file growth failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// On-disk inconsistency: a record chain that cannot be valid
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Property value encoding/decoding failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Entity with no in-use record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cursor or handle used outside its valid lifecycle
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Schema cache misuse (duplicate or unknown rule id)
    #[error("Schema rule error: {0}")]
    SchemaRule(String),

    /// Lock acquisition timed out
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid record (corruption) error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a schema rule error
    pub fn schema_rule(msg: impl Into<String>) -> Self {
        Self::SchemaRule(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error reports on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::InvalidRecord(_) | Self::Codec(_))
    }

    /// Whether this error reports a caller bug rather than a data problem
    pub fn is_logic_error(&self) -> bool {
        matches!(self, Self::InvalidState(_) | Self::SchemaRule(_))
    }
}
