//! # Node Runtime
//!
//! Builds one node from a [`NodeConfig`]:
//!
//! ```text
//!   PeerTransport <── ConsensusService ──> PipelineLedger
//!                          │                 │        │
//!                   ConsensusEvent     BlockPipeline  PendingBlockPool
//!                          │                 │
//!                    fatal watcher      TaskEngine + UtxoStore
//! ```
//!
//! Everything is constructed here and handed down as `Arc`s or cheap
//! handles; nothing is global. [`NodeRuntime::shutdown`] stops consensus
//! first and then drains the task engine.

use crate::adapters::storage::DataDirLock;
use crate::adapters::transport::tcp::{self, TcpTransport, TcpTransportConfig};
use crate::adapters::PipelineLedger;
use crate::config::{NodeConfig, StorageBackend};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use ql_01_ledger_storage::{InMemoryKVStore, KeyValueStore, UtxoStore};
use ql_02_task_engine::TaskEngine;
use ql_03_block_pipeline::{BlockPipeline, PendingBlockPool};
use ql_04_consensus::{
    AcceptorSnapshot, ConsensusError, ConsensusEvent, ConsensusHandle, ConsensusService,
    PeerTransport, ProposalOutcome, SystemClock,
};
use shared_types::{Block, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for in-flight pipeline work.
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running node.
pub struct NodeRuntime {
    config: NodeConfig,
    engine: TaskEngine,
    utxos: UtxoStore,
    pending: PendingBlockPool,
    consensus: ConsensusHandle,
    stopped: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    consensus_task: Mutex<Option<JoinHandle<()>>>,
    _lock: Option<DataDirLock>,
}

impl NodeRuntime {
    /// Open the configured store and start the node on `transport`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: NodeConfig, transport: Arc<dyn PeerTransport>) -> Result<Self> {
        let (kv, lock) = open_store(&config)?;
        let mut runtime = Self::start_with_store(config, kv, transport)?;
        runtime._lock = lock;
        Ok(runtime)
    }

    /// Start the node over an existing store.
    pub fn start_with_store(
        config: NodeConfig,
        kv: Arc<dyn KeyValueStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self> {
        config.validate().context("invalid node configuration")?;

        let engine =
            TaskEngine::new(config.engine_config()).context("failed to start task engine")?;
        let utxos = UtxoStore::new(kv);
        let pending = PendingBlockPool::new();
        let ledger = Arc::new(PipelineLedger::new(
            BlockPipeline::new(engine.clone(), utxos.clone()),
            pending.clone(),
        ));

        let (consensus, consensus_task) = ConsensusService::spawn(
            config.consensus_config(),
            transport,
            ledger,
            Arc::new(SystemClock),
        )
        .context("failed to start consensus service")?;

        let stopped = Arc::new(watch::channel(false).0);
        let watcher = spawn_fatal_watcher(consensus.clone(), Arc::clone(&stopped));

        info!(
            node = %config.network.node_id,
            cluster = config.cluster().len(),
            workers = engine.worker_threads(),
            backend = ?config.storage.backend,
            "node started"
        );
        Ok(Self {
            config,
            engine,
            utxos,
            pending,
            consensus,
            stopped,
            tasks: Mutex::new(vec![watcher]),
            consensus_task: Mutex::new(Some(consensus_task)),
            _lock: None,
        })
    }

    /// Start a node that talks to its peers over TCP.
    pub async fn start_tcp(config: NodeConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.network.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.network.listen_addr))?;
        let transport = TcpTransport::connect(TcpTransportConfig::new(
            config.network.node_id,
            config
                .network
                .peers
                .iter()
                .map(|peer| (peer.id, peer.address))
                .collect(),
            config.consensus_config().wire_hints(),
        ));

        let max_frame_bytes = config.network.max_frame_bytes;
        let runtime = Self::start(config, Arc::new(transport))?;
        let listener_task =
            tcp::spawn_listener(listener, Arc::new(runtime.consensus.clone()), max_frame_bytes);
        runtime.tasks.lock().push(listener_task);
        Ok(runtime)
    }

    pub fn node_id(&self) -> NodeId {
        self.config.network.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn consensus(&self) -> &ConsensusHandle {
        &self.consensus
    }

    pub fn utxos(&self) -> &UtxoStore {
        &self.utxos
    }

    pub fn pending_blocks(&self) -> &PendingBlockPool {
        &self.pending
    }

    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    /// Make a block body available for verification and commit.
    ///
    /// Peers agree on headers only; a node can vote for a block only once
    /// its body is registered here.
    pub fn register_block(&self, block: Block) -> Arc<Block> {
        self.pending.insert(block)
    }

    /// Register `block` and propose its header. Resolves when the round ends.
    pub async fn propose_block(&self, block: Block) -> Result<ProposalOutcome, ConsensusError> {
        let block = self.register_block(block);
        let hash = block.hash();
        info!(
            height = block.header.height,
            block = %hex::encode(&hash[..4]),
            transactions = block.transactions.len(),
            "proposing block"
        );

        let result = self.consensus.propose(block.header.clone()).await;
        if !matches!(result, Ok(ProposalOutcome::Accepted)) {
            self.pending.remove(&hash);
        }
        result
    }

    pub async fn state(&self) -> Result<AcceptorSnapshot, ConsensusError> {
        self.consensus.state().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.consensus.subscribe()
    }

    /// Flips to `true` once the node stops, including after a fatal ledger
    /// error.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    /// Stop consensus, then drain in-flight pipeline work.
    pub async fn shutdown(&self) {
        info!(node = %self.node_id(), "initiating graceful shutdown");
        self.consensus.shutdown().await;
        let consensus_task = self.consensus_task.lock().take();
        if let Some(task) = consensus_task {
            if let Err(e) = task.await {
                error!(error = %e, "consensus task ended abnormally");
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let engine = self.engine.clone();
        let drained = tokio::task::spawn_blocking(move || engine.shutdown(SHUTDOWN_DRAIN_TIMEOUT))
            .await
            .unwrap_or(false);
        if !drained {
            warn!(
                live_tasks = self.engine.live_tasks(),
                "task engine did not drain before the shutdown timeout"
            );
        }

        self.stopped.send_replace(true);
        info!(node = %self.node_id(), "shutdown complete");
    }
}

/// Open the key-value store named by `config.storage`.
pub fn open_store(config: &NodeConfig) -> Result<(Arc<dyn KeyValueStore>, Option<DataDirLock>)> {
    match config.storage.backend {
        StorageBackend::Memory => Ok((Arc::new(InMemoryKVStore::new()), None)),
        StorageBackend::RocksDb => open_rocksdb(config),
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(config: &NodeConfig) -> Result<(Arc<dyn KeyValueStore>, Option<DataDirLock>)> {
    use crate::adapters::storage::{RocksDbConfig, RocksDbStore};

    let data_dir = &config.storage.data_dir;
    let lock = DataDirLock::acquire(data_dir)?;
    let store = RocksDbStore::open(RocksDbConfig {
        path: data_dir.join("ledger"),
        sync_writes: config.storage.sync_writes,
        ..RocksDbConfig::default()
    })
    .with_context(|| format!("failed to open ledger store in {}", data_dir.display()))?;
    Ok((Arc::new(store), Some(lock)))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_config: &NodeConfig) -> Result<(Arc<dyn KeyValueStore>, Option<DataDirLock>)> {
    anyhow::bail!("storage backend `rocksdb` requires building with `--features rocksdb`")
}

fn spawn_fatal_watcher(
    consensus: ConsensusHandle,
    stopped: Arc<watch::Sender<bool>>,
) -> JoinHandle<()> {
    let mut events = consensus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConsensusEvent::Fatal { reason }) => {
                    error!(node = %consensus.node_id(), %reason, "fatal ledger error, stopping consensus");
                    consensus.shutdown().await;
                    stopped.send_replace(true);
                    break;
                }
                Ok(ConsensusEvent::RoundFinished { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "consensus event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
