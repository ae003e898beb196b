//! # Node Configuration
//!
//! Defaults come from `Default`, an optional JSON file (path in
//! `QL_CONFIG_FILE`) replaces them, and environment variables override
//! individual fields:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QL_NODE_ID` | `network.node_id` |
//! | `QL_LISTEN_ADDR` | `network.listen_addr` |
//! | `QL_PEERS` | `network.peers`, as `id@host:port,id@host:port` |
//! | `QL_DATA_DIR` | `storage.data_dir` |
//! | `QL_PROPOSAL_TIMEOUT_MS` | `consensus.proposal_timeout_ms` |
//! | `QL_WORKERS` | `engine.worker_threads` |

use ql_02_task_engine::EngineConfig;
use ql_04_consensus::ConsensusConfig;
use serde::{Deserialize, Serialize};
use shared_types::NodeId;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a JSON config file.
pub const CONFIG_FILE_ENV: &str = "QL_CONFIG_FILE";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub consensus: ConsensusSettings,
    pub engine: EngineSettings,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("cluster has no peers and no local node id")]
    EmptyCluster,

    #[error("peer {0} listed more than once")]
    DuplicatePeer(NodeId),

    #[error("peer address {0} listed more than once")]
    DuplicateAddress(SocketAddr),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// This node's identity. A random one is generated when unset.
    pub node_id: NodeId,
    /// Address the TCP transport listens on.
    pub listen_addr: SocketAddr,
    /// Every other cluster member.
    pub peers: Vec<PeerConfig>,
    /// Leave the protocol version off the wire; all peers must agree.
    pub omit_version: bool,
    /// Largest TCP frame accepted from a peer, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::random(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7400)),
            peers: Vec::new(),
            omit_version: false,
            max_frame_bytes: 4 * 1024,
        }
    }
}

/// A remote cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    pub address: SocketAddr,
}

impl std::str::FromStr for PeerConfig {
    type Err = String;

    /// Parses `id@host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, address) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| format!("{s:?} is not of the form id@host:port"))?;
        Ok(Self {
            id: id.parse().map_err(|e| format!("{e}"))?,
            address: address
                .parse()
                .map_err(|e| format!("bad address {address:?}: {e}"))?,
        })
    }
}

/// Which key-value store backs the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    RocksDb,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Data directory for the RocksDB backend.
    pub data_dir: PathBuf,
    /// fsync every committed block.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            sync_writes: true,
        }
    }
}

/// Consensus tuning. Cluster membership comes from [`NetworkConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSettings {
    pub proposal_timeout_ms: u64,
    pub event_capacity: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        let defaults = ConsensusConfig::default();
        Self {
            proposal_timeout_ms: defaults.proposal_timeout_ms,
            event_capacity: defaults.event_capacity,
        }
    }
}

/// Task engine sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub worker_threads: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_threads: EngineConfig::default().worker_threads,
        }
    }
}

impl NodeConfig {
    /// Load from `QL_CONFIG_FILE` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("QL_NODE_ID") {
            self.network.node_id = parse_env("QL_NODE_ID", &value)?;
        }
        if let Some(value) = lookup("QL_LISTEN_ADDR") {
            self.network.listen_addr = parse_env("QL_LISTEN_ADDR", &value)?;
        }
        if let Some(value) = lookup("QL_PEERS") {
            self.network.peers = value
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| {
                    entry.parse().map_err(|reason| ConfigError::InvalidEnv {
                        var: "QL_PEERS",
                        reason,
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup("QL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
            self.storage.backend = StorageBackend::RocksDb;
        }
        if let Some(value) = lookup("QL_PROPOSAL_TIMEOUT_MS") {
            self.consensus.proposal_timeout_ms = parse_env("QL_PROPOSAL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("QL_WORKERS") {
            self.engine.worker_threads = parse_env("QL_WORKERS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.node_id == NodeId::default() && self.network.peers.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }

        let mut ids = HashSet::from([self.network.node_id]);
        let mut addresses = HashSet::from([self.network.listen_addr]);
        for peer in &self.network.peers {
            if !ids.insert(peer.id) {
                return Err(ConfigError::DuplicatePeer(peer.id));
            }
            if !addresses.insert(peer.address) {
                return Err(ConfigError::DuplicateAddress(peer.address));
            }
        }

        if self.engine.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be positive".into()));
        }
        if self.network.max_frame_bytes < ql_04_consensus::codec::MAX_MESSAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_frame_bytes must hold one consensus message ({} bytes)",
                ql_04_consensus::codec::MAX_MESSAGE_SIZE
            )));
        }
        self.consensus_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Every voting member, this node first.
    pub fn cluster(&self) -> Vec<NodeId> {
        std::iter::once(self.network.node_id)
            .chain(self.network.peers.iter().map(|peer| peer.id))
            .collect()
    }

    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            node_id: self.network.node_id,
            cluster: self.cluster(),
            proposal_timeout_ms: self.consensus.proposal_timeout_ms,
            omit_version: self.network.omit_version,
            event_capacity: self.consensus.event_capacity,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_threads: self.engine.worker_threads,
            ..EngineConfig::default()
        }
    }

    /// A single-node, in-memory configuration with short timeouts.
    pub fn for_testing(node_id: NodeId) -> Self {
        Self {
            network: NetworkConfig {
                node_id,
                listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                ..NetworkConfig::default()
            },
            consensus: ConsensusSettings {
                proposal_timeout_ms: 300,
                ..ConsensusSettings::default()
            },
            engine: EngineSettings { worker_threads: 2 },
            ..Self::default()
        }
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
        })
}
