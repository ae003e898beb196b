//! Consensus configuration.

use super::error::ConsensusError;
use crate::codec::{WireHints, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use shared_types::NodeId;
use std::collections::HashSet;
use std::time::Duration;

/// Slot timeout for debug builds and tests.
pub const DEBUG_PROPOSAL_TIMEOUT_MS: u64 = 2_000;
/// Slot timeout for release builds.
pub const RELEASE_PROPOSAL_TIMEOUT_MS: u64 = 30_000;

/// Consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// This node.
    pub node_id: NodeId,
    /// Every voting member, this node included.
    pub cluster: Vec<NodeId>,
    /// How long a slot may stay busy before the round times out.
    pub proposal_timeout_ms: u64,
    /// Leave the protocol version off outgoing messages (peers assume it).
    pub omit_version: bool,
    /// Capacity of the consensus event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let proposal_timeout_ms = if cfg!(debug_assertions) {
            DEBUG_PROPOSAL_TIMEOUT_MS
        } else {
            RELEASE_PROPOSAL_TIMEOUT_MS
        };
        Self {
            node_id: NodeId::default(),
            cluster: Vec::new(),
            proposal_timeout_ms,
            omit_version: false,
            event_capacity: 256,
        }
    }
}

impl ConsensusConfig {
    pub fn new(node_id: NodeId, cluster: Vec<NodeId>) -> Self {
        Self {
            node_id,
            cluster,
            ..Self::default()
        }
    }

    /// A cluster of one: every proposal reaches quorum immediately.
    pub fn single_node(node_id: NodeId) -> Self {
        Self::new(node_id, vec![node_id])
    }

    /// Short timeouts for tests.
    pub fn for_testing(node_id: NodeId, cluster: Vec<NodeId>) -> Self {
        Self {
            proposal_timeout_ms: 150,
            ..Self::new(node_id, cluster)
        }
    }

    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_millis(self.proposal_timeout_ms)
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster.len()
    }

    /// Strict majority of the cluster.
    pub fn quorum(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// Members other than this node.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cluster.iter().copied().filter(|id| *id != self.node_id)
    }

    pub fn wire_hints(&self) -> WireHints {
        if self.omit_version {
            WireHints::default().with_version(PROTOCOL_VERSION)
        } else {
            WireHints::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.cluster.is_empty() {
            return Err(ConsensusError::InvalidConfig("cluster is empty".into()));
        }
        if !self.cluster.contains(&self.node_id) {
            return Err(ConsensusError::InvalidConfig(format!(
                "node {} is not a member of its own cluster",
                self.node_id
            )));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.cluster.iter().find(|id| !seen.insert(**id)) {
            return Err(ConsensusError::InvalidConfig(format!(
                "cluster lists {duplicate} twice"
            )));
        }
        if self.proposal_timeout_ms == 0 {
            return Err(ConsensusError::InvalidConfig(
                "proposal timeout must be positive".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConsensusError::InvalidConfig(
                "event capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
