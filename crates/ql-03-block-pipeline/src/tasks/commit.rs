//! Commit tree. Leaves stage their effect into their own slot of the shared
//! [`WriteBatchGroup`]; nothing touches storage until the group is flushed.

use crate::domain::{FailureLog, WriteBatchGroup};
use ql_01_ledger_storage::{UtxoStore, WriteBatch};
use ql_02_task_engine::{Task, TaskContext, TaskStatus};
use shared_types::{Block, UnspentOutputRecord};
use std::sync::Arc;

/// State every task of one commit tree shares.
#[derive(Clone)]
struct CommitShared {
    block: Arc<Block>,
    utxos: UtxoStore,
    group: Arc<WriteBatchGroup>,
    failures: FailureLog,
}

impl CommitShared {
    fn stage(&self, slot: usize, batch: WriteBatch) -> TaskStatus {
        match self.group.stage(slot, batch) {
            Ok(()) => TaskStatus::Successful,
            Err(e) => {
                self.failures.record(e.to_string());
                TaskStatus::Failed
            }
        }
    }
}

/// Root of the commit tree. Slots are laid out transaction by transaction,
/// inputs before outputs.
pub struct CommitBlockTask {
    shared: CommitShared,
}

impl CommitBlockTask {
    /// `group` must have one slot per input and output of `block`.
    pub fn new(
        block: Arc<Block>,
        utxos: UtxoStore,
        group: Arc<WriteBatchGroup>,
        failures: FailureLog,
    ) -> Self {
        Self {
            shared: CommitShared {
                block,
                utxos,
                group,
                failures,
            },
        }
    }
}

impl Task for CommitBlockTask {
    fn name(&self) -> &'static str {
        "commit-block"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        let expected = self.shared.block.effect_count();
        if self.shared.group.len() != expected {
            self.shared.failures.record(format!(
                "write group has {} slots, block needs {expected}",
                self.shared.group.len()
            ));
            return TaskStatus::Failed;
        }

        let mut slot_base = 0;
        for (tx_index, tx) in self.shared.block.transactions.iter().enumerate() {
            ctx.fork(CommitTransactionTask {
                shared: self.shared.clone(),
                tx_index,
                slot_base,
            });
            slot_base += tx.inputs.len() + tx.outputs.len();
        }
        TaskStatus::Successful
    }
}

pub struct CommitTransactionTask {
    shared: CommitShared,
    tx_index: usize,
    slot_base: usize,
}

impl Task for CommitTransactionTask {
    fn name(&self) -> &'static str {
        "commit-transaction"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        let inputs = self.shared.block.transactions[self.tx_index].inputs.len();
        ctx.fork(CommitTransactionInputsTask {
            shared: self.shared.clone(),
            tx_index: self.tx_index,
            slot_base: self.slot_base,
        });
        ctx.fork(CommitTransactionOutputsTask {
            shared: self.shared,
            tx_index: self.tx_index,
            slot_base: self.slot_base + inputs,
        });
        TaskStatus::Successful
    }
}

pub struct CommitTransactionInputsTask {
    shared: CommitShared,
    tx_index: usize,
    slot_base: usize,
}

impl Task for CommitTransactionInputsTask {
    fn name(&self) -> &'static str {
        "commit-inputs"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        let inputs = self.shared.block.transactions[self.tx_index].inputs.len();
        for input_index in 0..inputs {
            ctx.fork(CommitInputTask {
                shared: self.shared.clone(),
                tx_index: self.tx_index,
                input_index,
                slot: self.slot_base + input_index,
            });
        }
        TaskStatus::Successful
    }
}

pub struct CommitTransactionOutputsTask {
    shared: CommitShared,
    tx_index: usize,
    slot_base: usize,
}

impl Task for CommitTransactionOutputsTask {
    fn name(&self) -> &'static str {
        "commit-outputs"
    }

    fn run(self: Box<Self>, ctx: &mut TaskContext<'_>) -> TaskStatus {
        let outputs = self.shared.block.transactions[self.tx_index].outputs.len();
        for output_index in 0..outputs {
            ctx.fork(CommitOutputTask {
                shared: self.shared.clone(),
                tx_index: self.tx_index,
                output_index,
                slot: self.slot_base + output_index,
            });
        }
        TaskStatus::Successful
    }
}

/// Stages removal of a spent record. The record must still be present.
pub struct CommitInputTask {
    shared: CommitShared,
    tx_index: usize,
    input_index: usize,
    slot: usize,
}

impl Task for CommitInputTask {
    fn name(&self) -> &'static str {
        "commit-input"
    }

    fn run(self: Box<Self>, _ctx: &mut TaskContext<'_>) -> TaskStatus {
        let input = &self.shared.block.transactions[self.tx_index].inputs[self.input_index];
        let output = hex::encode(&input.output_hash[..4]);

        match self.shared.utxos.contains(&input.output_hash) {
            Ok(true) => {}
            Ok(false) => {
                self.shared
                    .failures
                    .record(format!("output {output} vanished before commit"));
                return TaskStatus::Failed;
            }
            Err(e) => {
                self.shared
                    .failures
                    .record_storage(&format!("reading output {output}"), e);
                return TaskStatus::Failed;
            }
        }

        let mut batch = WriteBatch::new();
        UtxoStore::stage_spend(&mut batch, &input.output_hash);
        self.shared.stage(self.slot, batch)
    }
}

/// Stages creation of a new record keyed by the derived output key.
pub struct CommitOutputTask {
    shared: CommitShared,
    tx_index: usize,
    output_index: usize,
    slot: usize,
}

impl Task for CommitOutputTask {
    fn name(&self) -> &'static str {
        "commit-output"
    }

    fn run(self: Box<Self>, _ctx: &mut TaskContext<'_>) -> TaskStatus {
        let tx = &self.shared.block.transactions[self.tx_index];
        let (Some(output), Some(key)) = (
            tx.outputs.get(self.output_index),
            tx.output_key(self.output_index),
        ) else {
            self.shared
                .failures
                .record(format!("output index {} out of range", self.output_index));
            return TaskStatus::Failed;
        };

        match self.shared.utxos.contains(&key) {
            Ok(false) => {}
            Ok(true) => {
                self.shared.failures.record(format!(
                    "output {} already exists",
                    hex::encode(&key[..4])
                ));
                return TaskStatus::Failed;
            }
            Err(e) => {
                self.shared.failures.record_storage("checking new output", e);
                return TaskStatus::Failed;
            }
        }

        let record = UnspentOutputRecord::new(tx.reference, output.owner.clone(), output.product.clone());
        let mut batch = WriteBatch::new();
        if let Err(e) = UtxoStore::stage_create(&mut batch, &key, &record) {
            self.shared.failures.record_storage("encoding new output", e);
            return TaskStatus::Failed;
        }
        self.shared.stage(self.slot, batch)
    }
}
