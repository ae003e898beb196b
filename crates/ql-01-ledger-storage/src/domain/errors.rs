//! # Domain Errors
//!
//! Error types for the ledger storage layer.
//!
//! `KVStoreError` is what adapters report; `StorageError` is what the typed
//! repository reports to the pipelines.

use shared_types::Hash;
use thiserror::Error;

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// The engine detected damaged data.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

/// Errors that can occur during ledger storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Database I/O error (a failed flush lands here).
    #[error("Database error: {message}")]
    DatabaseError { message: String },

    /// A record could not be encoded for staging.
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// A previously committed record failed to decode (INVARIANT-4).
    ///
    /// Committed data is presumed durable, so this is fatal for the node.
    #[error("Corrupted record {}: {message} (INVARIANT-4)", hex::encode(&key[..4]))]
    Corruption { key: Hash, message: String },
}

impl StorageError {
    /// Whether the error means durable state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::Corruption { .. })
    }
}

impl From<KVStoreError> for StorageError {
    fn from(err: KVStoreError) -> Self {
        StorageError::DatabaseError {
            message: err.to_string(),
        }
    }
}
