//! # Adapters Module
//!
//! - `memory`: ordered in-memory store (tests, single-process clusters)
//! - `mock`: fault-injecting wrapper for failure-path tests
//!
//! The RocksDB adapter lives in `node-runtime` behind the `rocksdb` feature.

mod memory;
mod mock;

pub use memory::InMemoryKVStore;
pub use mock::FaultyKVStore;
