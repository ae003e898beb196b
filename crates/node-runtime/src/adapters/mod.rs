//! # Adapters
//!
//! Port implementations that connect the consensus service to the rest of
//! the node.
//!
//! - `ledger`: [`BlockLedger`](ql_04_consensus::BlockLedger) over the block
//!   pipelines and the pending-block pool
//! - `transport`: in-process loopback network and TCP peer transport
//! - `storage`: RocksDB key-value store and the data directory lock

pub mod ledger;
pub mod storage;
pub mod transport;

pub use ledger::PipelineLedger;
