//! # Shared Types Crate
//!
//! This crate contains the ledger entities used by every other crate in the
//! workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: blocks, transactions and unspent-output
//!   records are defined once, here.
//! - **Fixed-width identity**: hashes are 32 bytes, node identifiers are
//!   16 bytes, so wire encodings stay fixed size.
//! - **Derived hashes**: header hashes, merkle roots and output keys are
//!   computed by [`hashing`], never supplied by callers.

pub mod entities;
pub mod errors;
pub mod hashing;

pub use entities::*;
pub use errors::*;
pub use hashing::{compute_merkle_root, derive_output_key, sha256};
