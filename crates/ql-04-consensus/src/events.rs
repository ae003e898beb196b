//! Events published by the consensus service.

use crate::domain::{ProposalId, ProposalOutcome};
use shared_types::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// A round ended on this node.
    RoundFinished {
        proposal_id: ProposalId,
        block_hash: Hash,
        height: u64,
        outcome: ProposalOutcome,
        /// This node proposed the block.
        local: bool,
    },
    /// Committed state can no longer be trusted; the node must stop.
    Fatal { reason: String },
}
