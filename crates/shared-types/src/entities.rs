//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `NodeId`
//! - **Chain**: `BlockHeader`, `Block`, `Transaction`
//! - **Ledger State**: `UnspentOutputRecord`

use crate::errors::IdParseError;
use crate::hashing::{compute_merkle_root, derive_output_key, sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// A 32-byte SHA-256 hash.
pub type Hash = [u8; 32];

/// The all-zero hash (parent of the first block, root of an empty block).
pub const ZERO_HASH: Hash = [0u8; 32];

/// Opaque 128-bit identifier of a node in the cluster.
///
/// Ordering is lexicographic over the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 16]);

/// A peer identifier (alias for `NodeId` in transport contexts).
pub type PeerId = NodeId;

impl NodeId {
    /// A fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Build an identifier from a big-endian integer (handy for tests and
    /// static cluster layouts).
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..4]))
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    /// Accepts a hyphenated/simple UUID or 32 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(uuid) = Uuid::parse_str(trimmed) {
            return Ok(Self(uuid.into_bytes()));
        }
        let bytes = hex::decode(trimmed).map_err(|_| IdParseError::InvalidFormat {
            input: s.to_string(),
        })?;
        let array: [u8; 16] = bytes.try_into().map_err(|_| IdParseError::InvalidFormat {
            input: s.to_string(),
        })?;
        Ok(Self(array))
    }
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// Identity of a transaction (hash over its inputs and outputs).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct TransactionReference(pub Hash);

impl fmt::Debug for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxRef({})", hex::encode(&self.0[..4]))
    }
}

/// Claimed owner of an output, e.g. `alice`.
pub type Owner = String;

/// Asset descriptor carried by an output.
pub type Product = String;

/// A candidate block header.
///
/// Every field is fixed width so the header encodes to exactly 112 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Unix timestamp (milliseconds) when the block was assembled.
    pub timestamp: u64,
    /// Block height in the chain.
    pub height: u64,
    /// Hash of the previous block.
    pub previous_hash: Hash,
    /// Merkle root of the block's transaction references.
    pub merkle_root: Hash,
    /// Hash of this header (over the four fields above).
    pub hash: Hash,
}

impl BlockHeader {
    /// Build a header and fill in its hash.
    pub fn new(timestamp: u64, height: u64, previous_hash: Hash, merkle_root: Hash) -> Self {
        let mut header = Self {
            timestamp,
            height,
            previous_hash,
            merkle_root,
            hash: ZERO_HASH,
        };
        header.hash = header.compute_hash();
        header
    }

    /// SHA-256 over timestamp, height, previous hash and merkle root.
    pub fn compute_hash(&self) -> Hash {
        sha256(&[
            &self.timestamp.to_le_bytes(),
            &self.height.to_le_bytes(),
            &self.previous_hash,
            &self.merkle_root,
        ])
    }

    /// Whether the stored hash matches the header contents.
    pub fn is_hash_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Reference from a transaction to the unspent output it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Key of the unspent output being spent.
    pub output_hash: Hash,
    /// Owner the spender claims the output belongs to.
    pub owner: Owner,
}

/// A new output created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Recipient of the output.
    pub owner: Owner,
    /// What the output carries.
    pub product: Product,
}

/// A transaction spending existing outputs and creating new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub reference: TransactionReference,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Build a transaction; the reference is derived from the nonce, the
    /// spent output keys and the created outputs.
    pub fn new(nonce: u64, inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        let mut preimage = Vec::with_capacity(8 + inputs.len() * 32 + outputs.len() * 16);
        preimage.extend_from_slice(&nonce.to_le_bytes());
        for input in &inputs {
            preimage.extend_from_slice(&input.output_hash);
        }
        for output in &outputs {
            preimage.extend_from_slice(&(output.owner.len() as u64).to_le_bytes());
            preimage.extend_from_slice(output.owner.as_bytes());
            preimage.extend_from_slice(&(output.product.len() as u64).to_le_bytes());
            preimage.extend_from_slice(output.product.as_bytes());
        }

        Self {
            reference: TransactionReference(sha256(&[b"tx", &preimage])),
            inputs,
            outputs,
        }
    }

    /// Key under which output `index` will be recorded once committed.
    pub fn output_key(&self, index: usize) -> Option<Hash> {
        self.outputs.get(index).map(|output| {
            derive_output_key(&self.reference, index as u32, &output.owner, &output.product)
        })
    }
}

/// A full block: header plus the transactions it commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block, computing its merkle root and header hash.
    pub fn new(
        timestamp: u64,
        height: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = compute_merkle_root(&Self::references(&transactions));
        Self {
            header: BlockHeader::new(timestamp, height, previous_hash, merkle_root),
            transactions,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Merkle root recomputed from the transactions actually carried.
    pub fn computed_merkle_root(&self) -> Hash {
        compute_merkle_root(&Self::references(&self.transactions))
    }

    /// Total number of inputs plus outputs across all transactions.
    pub fn effect_count(&self) -> usize {
        self.transactions
            .iter()
            .map(|tx| tx.inputs.len() + tx.outputs.len())
            .sum()
    }

    fn references(transactions: &[Transaction]) -> Vec<TransactionReference> {
        transactions.iter().map(|tx| tx.reference).collect()
    }
}

// =============================================================================
// CLUSTER C: LEDGER STATE
// =============================================================================

/// A ledger entry for an output created and not yet spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutputRecord {
    /// Transaction that created the output.
    pub created_by: TransactionReference,
    pub owner: Owner,
    pub product: Product,
}

impl UnspentOutputRecord {
    pub fn new(
        created_by: TransactionReference,
        owner: impl Into<Owner>,
        product: impl Into<Product>,
    ) -> Self {
        Self {
            created_by,
            owner: owner.into(),
            product: product.into(),
        }
    }
}
