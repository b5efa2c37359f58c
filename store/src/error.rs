//! Document store error types.

use thiserror::Error;

/// Errors that can occur in the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored document could not be parsed. Never auto-repaired.
    #[error("Storage corruption in document '{key}': {reason}")]
    StorageCorruption { key: String, reason: String },

    /// Document could not be serialized; nothing was written.
    #[error("Failed to serialize document '{key}': {reason}")]
    Serialization { key: String, reason: String },

    /// Underlying I/O failure.
    #[error("I/O error on document '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Key is not a valid logical document identifier.
    #[error("Invalid document key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }

    /// Check if this error means a document on disk is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::StorageCorruption { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
