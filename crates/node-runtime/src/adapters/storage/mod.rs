//! # Storage Adapters
//!
//! - `rocksdb_adapter`: durable [`KeyValueStore`](ql_01_ledger_storage::KeyValueStore)
//!   (feature `rocksdb`)
//! - `lock`: exclusive lock on the data directory

pub mod lock;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

pub use lock::{DataDirLock, LockError};
#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};
