//! # Block Pipeline (ql-03)
//!
//! Verifies candidate blocks against the UTXO set and commits accepted
//! blocks atomically, both as fork-join trees on the task engine.
//!
//! ## Verification Tree
//!
//! ```text
//! VerifyBlockTask (header hash, merkle root, duplicate spends)
//!   └── VerifyTransactionTask (one per transaction)
//!         └── VerifyInputTask (one per input: UTXO exists, owner matches)
//! ```
//!
//! ## Commit Tree
//!
//! ```text
//! CommitBlockTask
//!   └── CommitTransactionTask (one per transaction)
//!         ├── CommitTransactionInputsTask  └── CommitInputTask  (stage delete)
//!         └── CommitTransactionOutputsTask └── CommitOutputTask (stage create)
//! ```
//!
//! Every commit leaf owns one slot of a [`WriteBatchGroup`] fixed when the
//! tree is built. The group is drained into a single [`WriteBatch`] and
//! flushed only if the whole tree succeeded; otherwise it is dropped and
//! storage is untouched.
//!
//! [`WriteBatch`]: ql_01_ledger_storage::WriteBatch

pub mod domain;
pub mod pending;
pub mod service;
pub mod tasks;

pub use domain::{FailureLog, PipelineError, WriteBatchGroup};
pub use pending::PendingBlockPool;
pub use service::{BlockPipeline, StagedBlock};
