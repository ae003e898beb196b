//! Ports (Hexagonal Architecture)
//!
//! - `inbound`: what the node (transports, block producers) calls
//! - `outbound`: what consensus needs from the rest of the node

pub mod inbound;
pub mod outbound;

pub use inbound::ConsensusApi;
pub use outbound::{BlockLedger, Clock, LedgerError, PeerTransport, SystemClock};
