//! Ledger fixtures and in-process clusters shared by the integration tests
//! and benchmarks.

use anyhow::Result;
use node_runtime::config::{PeerConfig, StorageBackend};
use node_runtime::{LoopbackNetwork, NodeConfig, NodeRuntime};
use ql_01_ledger_storage::{InMemoryKVStore, KeyValueStore, ScanResult, UtxoStore};
use ql_04_consensus::{AcceptorSnapshot, AcceptorState, ConsensusApi};
use shared_types::{
    Block, Hash, NodeId, Transaction, TransactionInput, TransactionOutput, TransactionReference,
    UnspentOutputRecord, ZERO_HASH,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// First unspent output owned by `alice` at genesis.
pub const ALICE_1: Hash = [0xA1; 32];
/// Second unspent output owned by `alice` at genesis.
pub const ALICE_2: Hash = [0xA2; 32];

/// Genesis allocation used by every fixture ledger.
pub fn genesis() -> Vec<(Hash, UnspentOutputRecord)> {
    let minted_by = TransactionReference([0x01; 32]);
    vec![
        (ALICE_1, UnspentOutputRecord::new(minted_by, "alice", "widget")),
        (ALICE_2, UnspentOutputRecord::new(minted_by, "alice", "gadget")),
    ]
}

/// A transaction spending `inputs` (output key, claimed owner) and creating
/// `outputs` (owner, product).
pub fn transfer(nonce: u64, inputs: &[(Hash, &str)], outputs: &[(&str, &str)]) -> Transaction {
    Transaction::new(
        nonce,
        inputs
            .iter()
            .map(|(output_hash, owner)| TransactionInput {
                output_hash: *output_hash,
                owner: owner.to_string(),
            })
            .collect(),
        outputs
            .iter()
            .map(|(owner, product)| TransactionOutput {
                owner: owner.to_string(),
                product: product.to_string(),
            })
            .collect(),
    )
}

pub fn block(height: u64, transactions: Vec<Transaction>) -> Block {
    Block::new(1_700_000_000_000 + height, height, ZERO_HASH, transactions)
}

/// A UTXO store over a fresh in-memory map, seeded with [`genesis`].
pub fn seeded_store() -> (Arc<InMemoryKVStore>, UtxoStore) {
    let kv = Arc::new(InMemoryKVStore::new());
    let utxos = UtxoStore::new(kv.clone());
    utxos
        .seed(genesis())
        .expect("seeding an in-memory store cannot fail");
    (kv, utxos)
}

/// Every key and value in `kv`, for bit-for-bit comparisons.
pub fn dump(kv: &dyn KeyValueStore) -> ScanResult {
    kv.iterate_ordered(b"").expect("full scan")
}

pub fn node_id(index: usize) -> NodeId {
    NodeId::from_u128(index as u128 + 1)
}

/// `size` nodes wired together over a [`LoopbackNetwork`], each with its own
/// in-memory ledger seeded with [`genesis`].
pub struct TestCluster {
    pub network: Arc<LoopbackNetwork>,
    pub nodes: Vec<NodeRuntime>,
}

impl TestCluster {
    /// Must be called inside a multi-threaded tokio runtime.
    pub fn start(size: usize, proposal_timeout_ms: u64) -> Result<Self> {
        let network = LoopbackNetwork::new();
        let ids: Vec<NodeId> = (0..size).map(node_id).collect();

        let mut nodes = Vec::with_capacity(size);
        for (index, id) in ids.iter().enumerate() {
            let mut config = NodeConfig::for_testing(*id);
            config.storage.backend = StorageBackend::Memory;
            config.consensus.proposal_timeout_ms = proposal_timeout_ms;
            config.network.listen_addr = address(index);
            config.network.peers = ids
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(other, peer)| PeerConfig {
                    id: *peer,
                    address: address(other),
                })
                .collect();

            let kv = Arc::new(InMemoryKVStore::new());
            UtxoStore::new(kv.clone()).seed(genesis())?;
            let transport = network.transport(
                *id,
                config.cluster(),
                config.consensus_config().wire_hints(),
            );
            let node = NodeRuntime::start_with_store(config, kv, Arc::new(transport))?;
            let api: Arc<dyn ConsensusApi> = Arc::new(node.consensus().clone());
            network.register(*id, api);
            nodes.push(node);
        }
        Ok(Self { network, nodes })
    }

    pub fn node(&self, index: usize) -> &NodeRuntime {
        &self.nodes[index]
    }

    /// Give every node the body of `block`.
    pub fn register_everywhere(&self, block: &Block) {
        for node in &self.nodes {
            node.register_block(block.clone());
        }
    }

    /// Wait until no node has an active round.
    pub async fn settle(&self, within: Duration) -> Vec<AcceptorSnapshot> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let mut snapshots = Vec::with_capacity(self.nodes.len());
            for node in &self.nodes {
                snapshots.push(node.state().await.expect("node running"));
            }
            if snapshots.iter().all(|s| s.state == AcceptorState::Idle)
                || tokio::time::Instant::now() >= deadline
            {
                return snapshots;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

fn address(index: usize) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 17_400 + index as u16))
}
