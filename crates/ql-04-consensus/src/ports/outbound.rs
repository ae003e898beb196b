//! Driven ports (Outbound dependencies)

use crate::domain::{ConsensusMessage, TransportError};
use async_trait::async_trait;
use shared_types::{BlockHeader, NodeId};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::Instant;

/// Delivery of consensus messages to peers.
///
/// Both calls are fire-and-forget: success means the message was handed to
/// the transport, not that it arrived.
pub trait PeerTransport: Send + Sync {
    /// Send to every cluster member except this node.
    fn broadcast(&self, message: &ConsensusMessage) -> Result<(), TransportError>;

    fn send(&self, peer: NodeId, message: &ConsensusMessage) -> Result<(), TransportError>;
}

/// Failures reported by the ledger behind consensus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The block is not acceptable. The round ends `Rejected`.
    #[error("Block verification failed: {0}")]
    VerificationFailed(String),

    /// Storage failed; nothing was applied. The round ends `Rejected`.
    #[error("Ledger storage error: {0}")]
    Storage(String),

    /// Committed state is damaged. The node must stop.
    #[error("Ledger corruption: {0}")]
    Corruption(String),
}

impl LedgerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Corruption(_))
    }
}

/// The verification and commit pipelines, as consensus sees them.
///
/// `stage_block` computes a block's effects without writing them;
/// `flush_block` writes a staged block atomically. Consensus flushes only
/// while the slot is still committing the same proposal, and drops stale
/// staged values unflushed.
#[async_trait]
pub trait BlockLedger: Send + Sync + 'static {
    type Staged: Send + 'static;

    async fn verify_block(&self, header: &BlockHeader) -> Result<(), LedgerError>;

    async fn stage_block(&self, header: &BlockHeader) -> Result<Self::Staged, LedgerError>;

    fn flush_block(&self, staged: Self::Staged) -> Result<(), LedgerError>;
}

/// Time source.
pub trait Clock: Send + Sync {
    /// Monotonic time for deadlines.
    fn now(&self) -> Instant;

    /// Wall clock, Unix-epoch milliseconds, for proposal timestamps.
    fn wall_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}
