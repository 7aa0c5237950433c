//! Error types for Quark atoms.

use thiserror::Error;

/// Errors raised by key-value store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Key cannot be represented by the backend.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Error type for atom operations.
#[derive(Debug, Error)]
pub enum AtomError {
    /// The reducer rejected an update.
    #[error("Reducer error: {0}")]
    Reducer(String),

    /// A committed value could not be serialized for write-back.
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// A stored value could not be deserialized during hydration.
    #[error("Deserialization error: {0}")]
    Deserialize(String),

    /// The key-value store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The task running an update panicked or was aborted.
    #[error("Update task failed: {0}")]
    TaskFailed(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AtomError {
    /// Create a reducer error.
    pub fn reducer(message: impl Into<String>) -> Self {
        Self::Reducer(message.into())
    }

    /// Create a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize(message.into())
    }

    /// Create a deserialization error.
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the reducer rejected the update.
    pub fn is_reducer(&self) -> bool {
        matches!(self, Self::Reducer(_))
    }

    /// Returns true if this error came from the store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type for atom operations.
pub type Result<T> = std::result::Result<T, AtomError>;
