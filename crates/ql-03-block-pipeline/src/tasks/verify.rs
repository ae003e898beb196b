//! Verification tree. Reads the UTXO set only.

use crate::domain::FailureLog;
use ql_01_ledger_storage::UtxoStore;
use ql_02_task_engine::{Task, TaskContext, TaskStatus};
use shared_types::Block;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Root of the verification tree.
///
/// Checks that apply to the block as a whole run here; per-input checks are
/// forked.
pub struct VerifyBlockTask {
    block: Arc<Block>,
    utxos: UtxoStore,
    failures: FailureLog,
}

impl VerifyBlockTask {
    pub fn new(block: Arc<Block>, utxos: UtxoStore, failures: FailureLog) -> Self {
        Self {
            block,
            utxos,
            failures,
        }
    }

    fn check_block(&self) -> bool {
        let header = &self.block.header;
        if !header.is_hash_valid() {
            self.failures.record("header hash does not match header contents");
            return false;
        }
        if header.merkle_root != self.block.computed_merkle_root() {
            self.failures.record("merkle root does not match transactions");
            return false;
        }

        let mut spent = HashSet::new();
        for tx in &self.block.transactions {
            for input in &tx.inputs {
                if !spent.insert(input.output_hash) {
                    self.failures.record(format!(
                        "output {} spent twice in block",
                        hex::encode(&input.output_hash[..4])
                    ));
                    return false;
                }
            }
        }
        true
    }
}

impl Task for VerifyBlockTask {
    fn name(&self) -> &'static str {
        "verify-block"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        if !self.check_block() {
            return TaskStatus::Failed;
        }

        for tx_index in 0..self.block.transactions.len() {
            ctx.fork(VerifyTransactionTask {
                block: Arc::clone(&self.block),
                tx_index,
                utxos: self.utxos.clone(),
                failures: self.failures.clone(),
            });
        }
        trace!(height = self.block.header.height, forked = ctx.forked(), "verifying block");
        TaskStatus::Successful
    }
}

pub struct VerifyTransactionTask {
    block: Arc<Block>,
    tx_index: usize,
    utxos: UtxoStore,
    failures: FailureLog,
}

impl Task for VerifyTransactionTask {
    fn name(&self) -> &'static str {
        "verify-transaction"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        let inputs = self.block.transactions[self.tx_index].inputs.len();
        for input_index in 0..inputs {
            ctx.fork(VerifyInputTask {
                block: Arc::clone(&self.block),
                tx_index: self.tx_index,
                input_index,
                utxos: self.utxos.clone(),
                failures: self.failures.clone(),
            });
        }
        TaskStatus::Successful
    }
}

/// Succeeds iff the spent output exists and belongs to the claimed owner.
pub struct VerifyInputTask {
    block: Arc<Block>,
    tx_index: usize,
    input_index: usize,
    utxos: UtxoStore,
    failures: FailureLog,
}

impl Task for VerifyInputTask {
    fn name(&self) -> &'static str {
        "verify-input"
    }

    fn run(self: Box<Self>, _ctx: &mut TaskContext<'_>) -> TaskStatus {
        let input = &self.block.transactions[self.tx_index].inputs[self.input_index];
        let output = hex::encode(&input.output_hash[..4]);

        match self.utxos.get(&input.output_hash) {
            Ok(Some(record)) if record.owner == input.owner => TaskStatus::Successful,
            Ok(Some(record)) => {
                self.failures.record(format!(
                    "output {output} belongs to {}, not {}",
                    record.owner, input.owner
                ));
                TaskStatus::Failed
            }
            Ok(None) => {
                self.failures
                    .record(format!("output {output} is missing or already spent"));
                TaskStatus::Failed
            }
            Err(e) => {
                self.failures
                    .record_storage(&format!("reading output {output}"), e);
                TaskStatus::Failed
            }
        }
    }
}
