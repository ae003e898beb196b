//! # Peer Transports
//!
//! Both transports encode with the node's [`WireHints`](ql_04_consensus::WireHints)
//! and hand received bytes to [`ConsensusApi::on_consensus_message`](ql_04_consensus::ConsensusApi).
//!
//! - `loopback`: in-process delivery between nodes of one test cluster,
//!   with partitions
//! - `tcp`: length-prefixed frames over persistent TCP connections

pub mod loopback;
pub mod tcp;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use tcp::{TcpTransport, TcpTransportConfig};
