//! # Node Runtime Library
//!
//! Everything the `node-runtime` binary wires together, exposed for the
//! workspace integration tests.
//!
//! - `config` - `NodeConfig`: defaults, JSON file, environment overrides
//! - `logging` - tracing subscriber setup
//! - `adapters` - ledger, transport and storage port implementations
//! - `runtime` - `NodeRuntime`: builds, runs and stops one node

pub mod adapters;
pub mod config;
pub mod logging;
pub mod runtime;

pub use adapters::transport::{LoopbackNetwork, LoopbackTransport, TcpTransport};
pub use adapters::PipelineLedger;
pub use config::{ConfigError, NodeConfig, PeerConfig, StorageBackend};
pub use runtime::NodeRuntime;
