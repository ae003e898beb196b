//! In-process network for multi-node clusters in one process.
//!
//! Messages go through the real codec, so peers see exactly the bytes a TCP
//! peer would. An isolated node neither sends nor receives; its traffic is
//! dropped silently, as a partitioned network would.

use parking_lot::RwLock;
use ql_04_consensus::{
    codec, ConsensusApi, ConsensusMessage, PeerTransport, TransportError, WireHints,
};
use shared_types::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Registry of the nodes reachable in this process.
#[derive(Default)]
pub struct LoopbackNetwork {
    nodes: RwLock<HashMap<NodeId, Arc<dyn ConsensusApi>>>,
    isolated: RwLock<HashSet<NodeId>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `id` reachable; received bytes go to `api`.
    pub fn register(&self, id: NodeId, api: Arc<dyn ConsensusApi>) {
        self.nodes.write().insert(id, api);
    }

    pub fn unregister(&self, id: &NodeId) {
        self.nodes.write().remove(id);
    }

    /// Cut `id` off from every other node.
    pub fn isolate(&self, id: NodeId) {
        debug!(node = %id, "loopback node isolated");
        self.isolated.write().insert(id);
    }

    pub fn heal(&self, id: &NodeId) {
        debug!(node = %id, "loopback node healed");
        self.isolated.write().remove(id);
    }

    /// Messages handed to a receiving node so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Messages lost to isolation so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Transport for `local`, reaching the other members of `cluster`.
    pub fn transport(
        self: &Arc<Self>,
        local: NodeId,
        cluster: Vec<NodeId>,
        hints: WireHints,
    ) -> LoopbackTransport {
        LoopbackTransport {
            network: Arc::clone(self),
            local,
            peers: cluster.into_iter().filter(|id| *id != local).collect(),
            hints,
        }
    }

    fn deliver(&self, from: NodeId, to: NodeId, bytes: &[u8]) -> Result<(), TransportError> {
        {
            let isolated = self.isolated.read();
            if isolated.contains(&from) || isolated.contains(&to) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(%from, %to, "loopback message dropped by partition");
                return Ok(());
            }
        }
        let api = self
            .nodes
            .read()
            .get(&to)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable {
                peer: to,
                reason: "not registered on the loopback network".to_string(),
            })?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = api.on_consensus_message(from, bytes) {
            debug!(%from, %to, error = %e, "loopback peer refused message");
        }
        Ok(())
    }
}

/// [`PeerTransport`] for one node on a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    local: NodeId,
    peers: Vec<NodeId>,
    hints: WireHints,
}

impl PeerTransport for LoopbackTransport {
    fn broadcast(&self, message: &ConsensusMessage) -> Result<(), TransportError> {
        let bytes = codec::encode_with(message, self.hints)?;
        for peer in &self.peers {
            if let Err(e) = self.network.deliver(self.local, *peer, &bytes) {
                debug!(peer = %peer, error = %e, "loopback broadcast skipped peer");
            }
        }
        Ok(())
    }

    fn send(&self, peer: NodeId, message: &ConsensusMessage) -> Result<(), TransportError> {
        if !self.peers.contains(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        let bytes = codec::encode_with(message, self.hints)?;
        self.network.deliver(self.local, peer, &bytes)
    }
}
