//! Error types for consensus.

use super::message::MessageKind;
use super::proposal::ProposalId;
use shared_types::NodeId;
use thiserror::Error;

/// Wire decoding and encoding failures. Nothing partially decoded is ever
/// returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Truncated message: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Oversized message: expected {expected} payload bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },

    #[error("Unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("Unsupported protocol version {actual} (expected {expected})")]
    UnsupportedVersion { expected: u16, actual: u16 },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Wire hint says {hinted}, message is {actual}")]
    HintMismatch {
        hinted: MessageKind,
        actual: MessageKind,
    },
}

/// Transport failures reported by a `PeerTransport` adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: NodeId, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Consensus error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// A round is already in progress on this node.
    #[error("Consensus slot busy with proposal {active}")]
    SlotBusy { active: ProposalId },

    #[error("Consensus service stopped")]
    ServiceStopped,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A message for a proposal other than the active one.
    #[error("Proposal mismatch: active {active:?}, received {received}")]
    ProtocolMismatch {
        active: Option<ProposalId>,
        received: ProposalId,
    },

    /// The round ended before enough distinct promises arrived.
    #[error("Quorum not reached: {promises} of {quorum} promises")]
    QuorumNotReached { promises: usize, quorum: usize },

    #[error("Message from {0}, which is not a cluster member")]
    UnknownPeer(NodeId),

    #[error("Invalid consensus configuration: {0}")]
    InvalidConfig(String),
}
