//! Proposals and their two orderings.
//!
//! Identity (equality, `Ord`, hashing) is the `proposal_id` alone. Priority,
//! used to resolve competing Prepares, is `(timestamp, proposer_id)`: the
//! later proposal wins, ties go to the larger proposer id.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeader, NodeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash as StdHash, Hasher};
use uuid::Uuid;

/// Opaque 128-bit proposal identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ProposalId(pub [u8; 16]);

impl ProposalId {
    /// A fresh identifier from a random v4 UUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", hex::encode(&self.0[..4]))
    }
}

/// Conflict-resolution rank of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority {
    pub timestamp: u64,
    pub proposer_id: NodeId,
}

/// A candidate block header offered to the cluster.
///
/// Field order is the wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Creation time, Unix-epoch milliseconds.
    pub timestamp: u64,
    pub proposal_id: ProposalId,
    pub proposer_id: NodeId,
    pub block_header: BlockHeader,
}

impl Proposal {
    pub fn new(proposer_id: NodeId, block_header: BlockHeader, timestamp: u64) -> Self {
        Self {
            timestamp,
            proposal_id: ProposalId::generate(),
            proposer_id,
            block_header,
        }
    }

    pub fn priority(&self) -> Priority {
        Priority {
            timestamp: self.timestamp,
            proposer_id: self.proposer_id,
        }
    }

    /// Whether `self` wins a conflict against `other`.
    pub fn outranks(&self, other: &Proposal) -> bool {
        self.priority() > other.priority()
    }

    pub fn height(&self) -> u64 {
        self.block_header.height
    }
}

impl PartialEq for Proposal {
    fn eq(&self, other: &Self) -> bool {
        self.proposal_id == other.proposal_id
    }
}

impl Eq for Proposal {}

impl PartialOrd for Proposal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Proposal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.proposal_id.cmp(&other.proposal_id)
    }
}

impl StdHash for Proposal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.proposal_id.hash(state);
    }
}
