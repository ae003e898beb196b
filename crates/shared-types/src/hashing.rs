//! # Hashing Helpers
//!
//! SHA-256 based derivations used by the ledger:
//!
//! - block header hashes (over the fixed-width header fields),
//! - merkle roots over transaction references,
//! - keys of newly created unspent outputs.

use crate::entities::{Hash, TransactionReference, ZERO_HASH};
use sha2::{Digest, Sha256};

/// SHA-256 over the concatenation of `parts`.
pub fn sha256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Merkle root over transaction references.
///
/// Pairs are hashed bottom-up; an odd node at any level is paired with
/// itself. The root of an empty block is [`ZERO_HASH`].
pub fn compute_merkle_root(references: &[TransactionReference]) -> Hash {
    if references.is_empty() {
        return ZERO_HASH;
    }

    let mut level: Vec<Hash> = references.iter().map(|r| r.0).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                sha256(&[left, right])
            })
            .collect();
    }
    level[0]
}

/// Key of the unspent output created at `index` of the transaction
/// identified by `reference`.
///
/// Owner and product are length-prefixed so that distinct pairs can never
/// produce the same preimage.
pub fn derive_output_key(
    reference: &TransactionReference,
    index: u32,
    owner: &str,
    product: &str,
) -> Hash {
    sha256(&[
        b"utxo",
        &reference.0,
        &index.to_le_bytes(),
        &(owner.len() as u64).to_le_bytes(),
        owner.as_bytes(),
        &(product.len() as u64).to_le_bytes(),
        product.as_bytes(),
    ])
}
