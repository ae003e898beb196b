//! Consensus messages exchanged between acceptors.

use super::proposal::Proposal;
use std::fmt;

/// Wire tag of each message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Prepare = 1,
    Promise = 2,
    Commit = 3,
    Accepted = 4,
    Rejected = 5,
}

impl MessageKind {
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::Prepare),
            2 => Some(MessageKind::Promise),
            3 => Some(MessageKind::Commit),
            4 => Some(MessageKind::Accepted),
            5 => Some(MessageKind::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Prepare => "prepare",
            MessageKind::Promise => "promise",
            MessageKind::Commit => "commit",
            MessageKind::Accepted => "accepted",
            MessageKind::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A consensus message. Every kind carries exactly one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessage {
    Prepare(Proposal),
    Promise(Proposal),
    Commit(Proposal),
    Accepted(Proposal),
    Rejected(Proposal),
}

impl ConsensusMessage {
    pub fn new(kind: MessageKind, proposal: Proposal) -> Self {
        match kind {
            MessageKind::Prepare => ConsensusMessage::Prepare(proposal),
            MessageKind::Promise => ConsensusMessage::Promise(proposal),
            MessageKind::Commit => ConsensusMessage::Commit(proposal),
            MessageKind::Accepted => ConsensusMessage::Accepted(proposal),
            MessageKind::Rejected => ConsensusMessage::Rejected(proposal),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::Prepare(_) => MessageKind::Prepare,
            ConsensusMessage::Promise(_) => MessageKind::Promise,
            ConsensusMessage::Commit(_) => MessageKind::Commit,
            ConsensusMessage::Accepted(_) => MessageKind::Accepted,
            ConsensusMessage::Rejected(_) => MessageKind::Rejected,
        }
    }

    pub fn proposal(&self) -> &Proposal {
        match self {
            ConsensusMessage::Prepare(p)
            | ConsensusMessage::Promise(p)
            | ConsensusMessage::Commit(p)
            | ConsensusMessage::Accepted(p)
            | ConsensusMessage::Rejected(p) => p,
        }
    }

    pub fn into_proposal(self) -> Proposal {
        match self {
            ConsensusMessage::Prepare(p)
            | ConsensusMessage::Promise(p)
            | ConsensusMessage::Commit(p)
            | ConsensusMessage::Accepted(p)
            | ConsensusMessage::Rejected(p) => p,
        }
    }
}
