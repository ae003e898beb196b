//! Driving ports (Inbound API)

use crate::domain::{AcceptorSnapshot, ConsensusError, ProposalOutcome};
use async_trait::async_trait;
use shared_types::{BlockHeader, NodeId};

/// Consensus API for the rest of the node.
#[async_trait]
pub trait ConsensusApi: Send + Sync {
    /// Propose a block header; resolves once the round ends.
    ///
    /// Fails up front with `SlotBusy` if a round is already in progress.
    async fn propose(&self, header: BlockHeader) -> Result<ProposalOutcome, ConsensusError>;

    /// Hand over raw bytes received from `peer`.
    ///
    /// Undecodable bytes are dropped and reported; nothing reaches the
    /// acceptor.
    fn on_consensus_message(&self, peer: NodeId, bytes: &[u8]) -> Result<(), ConsensusError>;

    /// Current acceptor state.
    async fn state(&self) -> Result<AcceptorSnapshot, ConsensusError>;
}
