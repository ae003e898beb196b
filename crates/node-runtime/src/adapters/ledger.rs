//! # Pipeline Ledger Adapter
//!
//! Consensus agrees on headers; the bodies it verifies and commits are looked
//! up by hash in the node's [`PendingBlockPool`].

use async_trait::async_trait;
use ql_03_block_pipeline::{BlockPipeline, PendingBlockPool, PipelineError, StagedBlock};
use ql_04_consensus::{BlockLedger, LedgerError};
use shared_types::{Block, BlockHeader};
use std::sync::Arc;
use tracing::debug;

/// [`BlockLedger`] backed by the verification and commit pipelines.
#[derive(Clone)]
pub struct PipelineLedger {
    pipeline: BlockPipeline,
    pending: PendingBlockPool,
}

impl PipelineLedger {
    pub fn new(pipeline: BlockPipeline, pending: PendingBlockPool) -> Self {
        Self { pipeline, pending }
    }

    pub fn pipeline(&self) -> &BlockPipeline {
        &self.pipeline
    }

    pub fn pending(&self) -> &PendingBlockPool {
        &self.pending
    }

    fn body(&self, header: &BlockHeader) -> Result<Arc<Block>, LedgerError> {
        let block = self.pending.get(&header.hash).ok_or_else(|| {
            LedgerError::VerificationFailed(format!(
                "no body known for block {}",
                hex::encode(&header.hash[..4])
            ))
        })?;
        if block.header != *header {
            return Err(LedgerError::VerificationFailed(format!(
                "body registered under {} carries a different header",
                hex::encode(&header.hash[..4])
            )));
        }
        Ok(block)
    }
}

#[async_trait]
impl BlockLedger for PipelineLedger {
    type Staged = StagedBlock;

    async fn verify_block(&self, header: &BlockHeader) -> Result<(), LedgerError> {
        let block = self.body(header)?;
        self.pipeline.verify(block).await.map_err(to_ledger_error)
    }

    async fn stage_block(&self, header: &BlockHeader) -> Result<StagedBlock, LedgerError> {
        let block = self.body(header)?;
        self.pipeline
            .stage_commit(block)
            .await
            .map_err(to_ledger_error)
    }

    fn flush_block(&self, staged: StagedBlock) -> Result<(), LedgerError> {
        let height = staged.height();
        self.pipeline.flush(staged).map_err(to_ledger_error)?;
        let pruned = self.pending.prune_through(height);
        debug!(height, pruned, "pending bodies pruned");
        Ok(())
    }
}

fn to_ledger_error(err: PipelineError) -> LedgerError {
    match err {
        e if e.is_fatal() => LedgerError::Corruption(e.to_string()),
        e @ (PipelineError::VerificationFailed { .. } | PipelineError::CommitFailed { .. }) => {
            LedgerError::VerificationFailed(e.to_string())
        }
        e => LedgerError::Storage(e.to_string()),
    }
}
