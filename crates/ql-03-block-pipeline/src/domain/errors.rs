//! # Pipeline Errors

use ql_01_ledger_storage::StorageError;
use thiserror::Error;

/// Errors produced by the verification and commit pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The block is invalid against the current ledger.
    #[error("Block {block} failed verification: {}", .reasons.join("; "))]
    VerificationFailed { block: String, reasons: Vec<String> },

    /// A commit leaf could not stage its effect.
    #[error("Block {block} could not be staged: {}", .reasons.join("; "))]
    CommitFailed { block: String, reasons: Vec<String> },

    /// Storage failed while reading or flushing.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The task engine refused or abandoned the run.
    #[error("Task engine stopped before block {block} was processed")]
    EngineStopped { block: String },

    #[error("Write slot {slot} out of range ({len} slots)")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("Write slot {slot} staged twice")]
    SlotOccupied { slot: usize },

    #[error("Write slot {slot} was never staged")]
    IncompleteGroup { slot: usize },
}

impl PipelineError {
    /// Whether durable state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Storage(e) if e.is_fatal())
    }
}

/// Short printable form of a block hash for errors and logs.
pub(crate) fn short_hash(hash: &[u8; 32]) -> String {
    hex::encode(&hash[..4])
}
