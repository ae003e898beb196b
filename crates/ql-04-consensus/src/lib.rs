//! # Consensus (ql-04)
//!
//! Single-slot, Paxos-style agreement on proposed blocks.
//!
//! ## Round
//!
//! ```text
//! Proposer                         Participants
//!    │──────── Prepare ──────────────→│
//!    │←─────── Promise ───────────────│   (quorum = cluster/2 + 1, own promise counts)
//!    │──────── Commit ───────────────→│
//!    │  verify → stage → flush        │  verify → stage → flush
//!    │──────── Accepted/Rejected ────→│
//! ```
//!
//! ## Structure
//!
//! - [`acceptor`]: the slot as a pure state machine emitting [`Action`]s
//! - [`codec`]: fixed-size wire encoding of [`ConsensusMessage`]s
//! - [`service`]: the event loop owning the acceptor; the only place it is
//!   mutated
//! - [`ports`]: transport, ledger and clock boundaries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ql_04_consensus::{ConsensusConfig, ConsensusService, SystemClock};
//!
//! let (handle, task) = ConsensusService::spawn(config, transport, ledger, Arc::new(SystemClock))?;
//! let outcome = handle.propose(block.header.clone()).await?;
//! ```

pub mod acceptor;
pub mod codec;
pub mod domain;
pub mod events;
pub mod ports;
pub mod service;

pub use acceptor::{Acceptor, Action};
pub use codec::{decode, decode_with, encode, encode_with, WireHints, PROTOCOL_VERSION};
pub use domain::{
    AcceptorSnapshot, AcceptorState, CodecError, ConsensusConfig, ConsensusError,
    ConsensusMessage, MessageKind, Priority, Proposal, ProposalId, ProposalOutcome,
    TransportError,
};
pub use events::ConsensusEvent;
pub use ports::{BlockLedger, Clock, ConsensusApi, LedgerError, PeerTransport, SystemClock};
pub use service::{ConsensusHandle, ConsensusService};
