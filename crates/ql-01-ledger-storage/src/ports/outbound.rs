//! # Outbound Ports (Driven Ports)
//!
//! The storage engine the ledger is committed into.
//!
//! Production: `RocksDbStore` (node-runtime/adapters/storage/rocksdb_adapter.rs)
//! Testing: `InMemoryKVStore`, `FaultyKVStore`

use crate::domain::batch::WriteBatch;
use crate::domain::errors::KVStoreError;

/// Result of an ordered prefix scan.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for an ordered, transactional key-value store.
///
/// All methods take `&self`: reads may run concurrently from many verification
/// workers while a single writer applies batches.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Apply a batch atomically.
    ///
    /// ## Atomicity Guarantee (INVARIANT-1)
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    fn put_batch(&self, batch: WriteBatch) -> Result<(), KVStoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn iterate_ordered(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Put a single key-value pair (a one-operation batch).
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        self.put_batch(batch)
    }

    /// Delete a single key (a one-operation batch).
    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key.to_vec());
        self.put_batch(batch)
    }
}
