//! # Key Layout
//!
//! Every ledger key is `prefix || body`. Prefixes keep record families in
//! separate ordered ranges so `iterate_ordered(prefix)` scans one family.

use shared_types::Hash;

/// Key prefixes used in the ledger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// `u:{output_hash}` -> bincode(UnspentOutputRecord)
    UnspentOutput,
}

impl KeyPrefix {
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            KeyPrefix::UnspentOutput => b"u:",
        }
    }

    /// Full key for a 32-byte body under this prefix.
    pub fn key(&self, body: &Hash) -> Vec<u8> {
        let prefix = self.as_bytes();
        let mut key = Vec::with_capacity(prefix.len() + body.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(body);
        key
    }

    /// Strip the prefix and return the 32-byte body, if the key has one.
    pub fn body(&self, key: &[u8]) -> Option<Hash> {
        key.strip_prefix(self.as_bytes())
            .and_then(|rest| rest.try_into().ok())
    }
}
