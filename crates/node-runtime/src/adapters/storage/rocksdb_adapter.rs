//! # RocksDB Storage Adapter
//!
//! Durable [`KeyValueStore`] for the ledger.
//!
//! - Atomic batch writes (`rocksdb::WriteBatch`)
//! - Snappy compression
//! - Bloom filters for point lookups of unspent outputs
//! - Optional fsync per committed block
//!
//! Ledger keys carry their own family prefix (`u:` for unspent outputs), so
//! one column family is enough and `iterate_ordered` is a bounded forward
//! scan from the prefix.

use ql_01_ledger_storage::{BatchOperation, KVStoreError, KeyValueStore, ScanResult, WriteBatch};
use rocksdb::{
    BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteOptions,
    DB,
};
use std::path::PathBuf;
use tracing::info;

/// RocksDB tuning.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    /// fsync after each batch (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/ledger"),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            write_buffer_size: 2 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed ledger store.
pub struct RocksDbStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| map_error("open", e))?;
        info!(path = %config.path.display(), sync = config.sync_writes, "ledger store opened");
        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }
}

fn map_error(op: &str, e: rocksdb::Error) -> KVStoreError {
    let message = format!("RocksDB {op} failed: {e}");
    if e.kind() == rocksdb::ErrorKind::Corruption {
        KVStoreError::CorruptionError { message }
    } else {
        KVStoreError::IOError { message }
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.get(key).map_err(|e| map_error("get", e))
    }

    fn put_batch(&self, batch: WriteBatch) -> Result<(), KVStoreError> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_operations() {
            match op {
                BatchOperation::Put { key, value } => rocks_batch.put(key, value),
                BatchOperation::Delete { key } => rocks_batch.delete(key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(rocks_batch, &write_opts)
            .map_err(|e| map_error("batch write", e))
    }

    fn iterate_ordered(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        let mut results = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| map_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.db
            .get_pinned(key)
            .map(|value| value.is_some())
            .map_err(|e| map_error("exists", e))
    }
}
