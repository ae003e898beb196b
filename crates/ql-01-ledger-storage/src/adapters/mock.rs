use super::memory::InMemoryKVStore;
use crate::domain::batch::WriteBatch;
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{KeyValueStore, ScanResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fault-injecting store for failure-path tests.
///
/// Wraps an [`InMemoryKVStore`]; a failed batch leaves the inner store
/// untouched.
#[derive(Default)]
pub struct FaultyKVStore {
    inner: InMemoryKVStore,
    fail_batches: AtomicBool,
    fail_reads: AtomicBool,
    batches_applied: AtomicU64,
}

impl FaultyKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_batch` fail until cleared.
    pub fn set_fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get` fail until cleared.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryKVStore {
        &self.inner
    }
}

impl KeyValueStore for FaultyKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KVStoreError::IOError {
                message: "injected read failure".to_string(),
            });
        }
        self.inner.get(key)
    }

    fn put_batch(&self, batch: WriteBatch) -> Result<(), KVStoreError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(KVStoreError::IOError {
                message: "injected batch failure".to_string(),
            });
        }
        self.inner.put_batch(batch)?;
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn iterate_ordered(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        self.inner.iterate_ordered(prefix)
    }
}
