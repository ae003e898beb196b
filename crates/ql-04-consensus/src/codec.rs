//! # Wire Codec
//!
//! ```text
//! [type: u8][version: u16 LE][proposal: 152 bytes]
//! ```
//!
//! The proposal payload is `bincode` with fixed-width little-endian
//! integers: timestamp (8), proposal id (16), proposer id (16), then the
//! header: timestamp (8), height (8), previous hash, merkle root and hash
//! (32 each).
//!
//! Either header field may be left off when [`WireHints`] says the receiver
//! already knows it; the decoder then takes it from its own hints.

use crate::domain::{CodecError, ConsensusMessage, MessageKind, Proposal};
use bincode::Options;

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Encoded size of a [`Proposal`].
pub const PROPOSAL_WIRE_SIZE: usize = 8 + 16 + 16 + 8 + 8 + 32 + 32 + 32;

/// Largest possible encoded message.
pub const MAX_MESSAGE_SIZE: usize = 1 + 2 + PROPOSAL_WIRE_SIZE;

/// Header fields both sides already agree on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireHints {
    pub known_kind: Option<MessageKind>,
    pub known_version: Option<u16>,
}

impl WireHints {
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.known_kind = Some(kind);
        self
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.known_version = Some(version);
        self
    }
}

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(PROPOSAL_WIRE_SIZE as u64)
}

pub fn encode(message: &ConsensusMessage) -> Result<Vec<u8>, CodecError> {
    encode_with(message, WireHints::default())
}

pub fn encode_with(message: &ConsensusMessage, hints: WireHints) -> Result<Vec<u8>, CodecError> {
    let kind = message.kind();
    let mut bytes = Vec::with_capacity(MAX_MESSAGE_SIZE);

    match hints.known_kind {
        Some(hinted) if hinted != kind => {
            return Err(CodecError::HintMismatch {
                hinted,
                actual: kind,
            })
        }
        Some(_) => {}
        None => bytes.push(kind.tag()),
    }
    if hints.known_version.is_none() {
        bytes.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    }

    payload_options()
        .serialize_into(&mut bytes, message.proposal())
        .map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<ConsensusMessage, CodecError> {
    decode_with(bytes, WireHints::default())
}

pub fn decode_with(bytes: &[u8], hints: WireHints) -> Result<ConsensusMessage, CodecError> {
    let mut rest = bytes;

    let kind = match hints.known_kind {
        Some(kind) => kind,
        None => {
            let (&tag, tail) = rest.split_first().ok_or(CodecError::Truncated {
                needed: 1,
                available: 0,
            })?;
            rest = tail;
            MessageKind::from_tag(tag).ok_or(CodecError::UnknownMessageType(tag))?
        }
    };

    let version = match hints.known_version {
        Some(version) => version,
        None => {
            if rest.len() < 2 {
                return Err(CodecError::Truncated {
                    needed: 2,
                    available: rest.len(),
                });
            }
            let (version, tail) = rest.split_at(2);
            rest = tail;
            u16::from_le_bytes([version[0], version[1]])
        }
    };
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }

    if rest.len() < PROPOSAL_WIRE_SIZE {
        return Err(CodecError::Truncated {
            needed: PROPOSAL_WIRE_SIZE,
            available: rest.len(),
        });
    }
    if rest.len() > PROPOSAL_WIRE_SIZE {
        return Err(CodecError::Oversized {
            expected: PROPOSAL_WIRE_SIZE,
            actual: rest.len(),
        });
    }

    let proposal: Proposal = payload_options()
        .deserialize(rest)
        .map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(ConsensusMessage::new(kind, proposal))
}
