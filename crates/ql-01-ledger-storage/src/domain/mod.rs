//! Domain layer for ledger storage.

pub mod batch;
pub mod errors;
pub mod keys;
