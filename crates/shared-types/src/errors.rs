//! # Error Types
//!
//! Errors raised while parsing shared identifiers.

use thiserror::Error;

/// Failure to parse a [`crate::NodeId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// Input was neither a UUID nor 32 hex characters.
    #[error("invalid node id {input:?}: expected a UUID or 32 hex characters")]
    InvalidFormat { input: String },
}
