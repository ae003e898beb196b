//! # Ledger Storage (ql-01)
//!
//! The ordered key-value store the ledger is committed into, expressed as a
//! port so the node can run on an in-memory map (tests) or RocksDB
//! (production, see `node-runtime`).
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Atomic Batches | A `WriteBatch` is applied completely or not at all |
//! | 2 | Ordered Iteration | Prefix scans return keys in ascending byte order |
//! | 3 | UTXO Presence | A record exists iff its output was created and not spent |
//! | 4 | Durable Records | A committed record that fails to decode is corruption |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Errors, write batches, key layout
//! - `ports/` - The `KeyValueStore` driven port
//! - `adapters/` - In-memory and fault-injecting stores
//! - `utxo.rs` - Typed repository for `UnspentOutputRecord`s

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod utxo;

pub use adapters::{FaultyKVStore, InMemoryKVStore};
pub use domain::batch::{BatchOperation, WriteBatch};
pub use domain::errors::{KVStoreError, StorageError};
pub use domain::keys::KeyPrefix;
pub use ports::outbound::{KeyValueStore, ScanResult};
pub use utxo::UtxoStore;
