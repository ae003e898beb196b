//! # Block Pipeline Service
//!
//! Runs the verification and commit trees on the task engine and flushes
//! staged commits.

use crate::domain::errors::short_hash;
use crate::domain::{FailureLog, PipelineError, WriteBatchGroup};
use crate::tasks::{CommitBlockTask, VerifyBlockTask};
use ql_01_ledger_storage::{UtxoStore, WriteBatch};
use ql_02_task_engine::{TaskEngine, TaskStatus};
use shared_types::{Block, Hash};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The effects of a block, computed but not yet written.
#[derive(Debug)]
pub struct StagedBlock {
    block_hash: Hash,
    height: u64,
    batch: WriteBatch,
}

impl StagedBlock {
    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Number of staged deletes and creates.
    pub fn operation_count(&self) -> usize {
        self.batch.len()
    }
}

/// Verification and commit pipelines over one UTXO store.
#[derive(Clone)]
pub struct BlockPipeline {
    engine: TaskEngine,
    utxos: UtxoStore,
}

impl BlockPipeline {
    pub fn new(engine: TaskEngine, utxos: UtxoStore) -> Self {
        Self { engine, utxos }
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    pub fn utxos(&self) -> &UtxoStore {
        &self.utxos
    }

    /// Check `block` against the current UTXO set. Reads only.
    pub async fn verify(&self, block: Arc<Block>) -> Result<(), PipelineError> {
        let failures = FailureLog::new();
        let handle = self.engine.schedule(VerifyBlockTask::new(
            Arc::clone(&block),
            self.utxos.clone(),
            failures.clone(),
        ));
        let status = handle.wait().await;

        let result = outcome(status, &block, &failures, |block, reasons| {
            PipelineError::VerificationFailed { block, reasons }
        });
        match &result {
            Ok(()) => debug!(height = block.header.height, "block verified"),
            Err(e) => info!(height = block.header.height, error = %e, "block rejected"),
        }
        result
    }

    /// Compute the block's effects into one batch without writing anything.
    pub async fn stage_commit(&self, block: Arc<Block>) -> Result<StagedBlock, PipelineError> {
        let failures = FailureLog::new();
        let group = Arc::new(WriteBatchGroup::with_slots(block.effect_count()));
        let handle = self.engine.schedule(CommitBlockTask::new(
            Arc::clone(&block),
            self.utxos.clone(),
            Arc::clone(&group),
            failures.clone(),
        ));
        let status = handle.wait().await;

        outcome(status, &block, &failures, |block, reasons| {
            PipelineError::CommitFailed { block, reasons }
        })?;
        let batch = group.drain()?;
        debug!(
            height = block.header.height,
            operations = batch.len(),
            "block staged"
        );
        Ok(StagedBlock {
            block_hash: block.hash(),
            height: block.header.height,
            batch,
        })
    }

    /// Write a staged block as one atomic batch.
    pub fn flush(&self, staged: StagedBlock) -> Result<(), PipelineError> {
        let StagedBlock {
            block_hash,
            height,
            batch,
        } = staged;
        let operations = batch.len();
        if let Err(e) = self.utxos.apply(batch) {
            error!(height, block = %short_hash(&block_hash), error = %e, "block flush failed");
            return Err(e.into());
        }
        info!(height, block = %short_hash(&block_hash), operations, "block committed");
        Ok(())
    }

    /// Verify, stage and flush in one call.
    pub async fn commit_block(&self, block: Arc<Block>) -> Result<(), PipelineError> {
        self.verify(Arc::clone(&block)).await?;
        let staged = self.stage_commit(block).await?;
        self.flush(staged)
    }
}

fn outcome(
    status: TaskStatus,
    block: &Block,
    failures: &FailureLog,
    rejected: impl FnOnce(String, Vec<String>) -> PipelineError,
) -> Result<(), PipelineError> {
    let hash = short_hash(&block.hash());
    match status {
        TaskStatus::Successful => Ok(()),
        TaskStatus::Cancelled => {
            warn!(block = %hash, "task engine stopped, block not processed");
            Err(PipelineError::EngineStopped { block: hash })
        }
        _ => {
            if let Some(fatal) = failures.fatal() {
                return Err(PipelineError::Storage(fatal));
            }
            let mut reasons = failures.reasons();
            if reasons.is_empty() {
                reasons.push(format!("task tree ended {status}"));
            }
            Err(rejected(hash, reasons))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ql_01_ledger_storage::{FaultyKVStore, InMemoryKVStore, KeyPrefix, KeyValueStore};
    use ql_02_task_engine::EngineConfig;
    use shared_types::{
        Transaction, TransactionInput, TransactionOutput, TransactionReference,
        UnspentOutputRecord, ZERO_HASH,
    };

    const ALICE_1: Hash = [0xA1; 32];
    const ALICE_2: Hash = [0xA2; 32];

    fn engine() -> TaskEngine {
        TaskEngine::new(EngineConfig::for_testing(4)).unwrap()
    }

    fn seeded(kv: Arc<dyn KeyValueStore>) -> UtxoStore {
        let utxos = UtxoStore::new(kv);
        utxos
            .seed([
                (
                    ALICE_1,
                    UnspentOutputRecord::new(TransactionReference([1u8; 32]), "alice", "gold"),
                ),
                (
                    ALICE_2,
                    UnspentOutputRecord::new(TransactionReference([2u8; 32]), "alice", "silver"),
                ),
            ])
            .unwrap();
        utxos
    }

    fn spend(output_hash: Hash, owner: &str) -> TransactionInput {
        TransactionInput {
            output_hash,
            owner: owner.to_string(),
        }
    }

    fn pay(owner: &str, product: &str) -> TransactionOutput {
        TransactionOutput {
            owner: owner.to_string(),
            product: product.to_string(),
        }
    }

    fn transfer_block() -> Block {
        let tx = Transaction::new(
            1,
            vec![spend(ALICE_1, "alice"), spend(ALICE_2, "alice")],
            vec![pay("bob", "gold"), pay("carol", "silver")],
        );
        Block::new(1_000, 5, ZERO_HASH, vec![tx])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_valid_block_commits_atomically() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos.clone());
        let block = Arc::new(transfer_block());

        pipeline.commit_block(Arc::clone(&block)).await.unwrap();

        assert!(!utxos.contains(&ALICE_1).unwrap());
        assert!(!utxos.contains(&ALICE_2).unwrap());

        let tx = &block.transactions[0];
        let bob = utxos.get(&tx.output_key(0).unwrap()).unwrap().unwrap();
        let carol = utxos.get(&tx.output_key(1).unwrap()).unwrap().unwrap();
        assert_eq!(bob.owner, "bob");
        assert_eq!(carol.owner, "carol");
        assert_eq!(bob.created_by, tx.reference);
        assert_eq!(utxos.all().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spent_input_is_rejected() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos.clone());
        let missing: Hash = [0xEE; 32];
        let tx = Transaction::new(2, vec![spend(missing, "alice")], vec![pay("bob", "gold")]);
        let block = Arc::new(Block::new(1_000, 5, ZERO_HASH, vec![tx]));

        let err = pipeline.verify(block).await.unwrap_err();
        assert!(matches!(err, PipelineError::VerificationFailed { .. }));
        assert!(err.to_string().contains("missing or already spent"));
        assert_eq!(utxos.all().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wrong_owner_is_rejected() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos);
        let tx = Transaction::new(3, vec![spend(ALICE_1, "mallory")], vec![pay("mallory", "gold")]);
        let block = Arc::new(Block::new(1_000, 5, ZERO_HASH, vec![tx]));

        let err = pipeline.verify(block).await.unwrap_err();
        assert!(err.to_string().contains("belongs to alice, not mallory"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tampered_merkle_root_is_rejected() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos);
        let mut block = transfer_block();
        block.transactions.push(Transaction::new(9, vec![], vec![pay("eve", "lead")]));

        let err = pipeline.verify(Arc::new(block)).await.unwrap_err();
        assert!(err.to_string().contains("merkle root"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_double_spend_within_block_is_rejected() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos);
        let first = Transaction::new(1, vec![spend(ALICE_1, "alice")], vec![pay("bob", "gold")]);
        let second = Transaction::new(2, vec![spend(ALICE_1, "alice")], vec![pay("carol", "gold")]);
        let block = Arc::new(Block::new(1_000, 5, ZERO_HASH, vec![first, second]));

        let err = pipeline.verify(block).await.unwrap_err();
        assert!(err.to_string().contains("spent twice"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_flush_leaves_storage_untouched() {
        let kv = Arc::new(FaultyKVStore::new());
        let utxos = seeded(kv.clone());
        let pipeline = BlockPipeline::new(engine(), utxos);
        let before = kv.iterate_ordered(b"").unwrap();

        let block = Arc::new(transfer_block());
        pipeline.verify(Arc::clone(&block)).await.unwrap();
        let staged = pipeline.stage_commit(block).await.unwrap();
        assert_eq!(staged.operation_count(), 4);

        kv.set_fail_batches(true);
        let err = pipeline.flush(staged).unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(!err.is_fatal());
        assert_eq!(kv.iterate_ordered(b"").unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_existing_output_fails_staging() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos.clone());
        let block = Arc::new(transfer_block());

        let tx = &block.transactions[0];
        let key = tx.output_key(1).unwrap();
        utxos
            .seed([(key, UnspentOutputRecord::new(tx.reference, "carol", "silver"))])
            .unwrap();

        let err = pipeline.stage_commit(block).await.unwrap_err();
        assert!(matches!(err, PipelineError::CommitFailed { .. }));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_corrupt_record_is_fatal() {
        let kv = Arc::new(InMemoryKVStore::new());
        let utxos = seeded(kv.clone());
        kv.put(&KeyPrefix::UnspentOutput.key(&ALICE_2), &[0xFF, 0x00])
            .unwrap();
        let pipeline = BlockPipeline::new(engine(), utxos);

        let err = pipeline.verify(Arc::new(transfer_block())).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stopped_engine_reports_engine_stopped() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let engine = engine();
        assert!(engine.shutdown(std::time::Duration::from_secs(1)));
        let pipeline = BlockPipeline::new(engine, utxos);

        let err = pipeline.verify(Arc::new(transfer_block())).await.unwrap_err();
        assert!(matches!(err, PipelineError::EngineStopped { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_block_commits_nothing() {
        let utxos = seeded(Arc::new(InMemoryKVStore::new()));
        let pipeline = BlockPipeline::new(engine(), utxos.clone());
        let block = Arc::new(Block::new(1_000, 6, ZERO_HASH, vec![]));

        pipeline.commit_block(block).await.unwrap();
        assert_eq!(utxos.all().unwrap().len(), 2);
    }
}
