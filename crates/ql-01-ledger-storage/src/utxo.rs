//! # Unspent Output Repository
//!
//! Typed access to `UnspentOutputRecord`s stored under `KeyPrefix::UnspentOutput`.
//!
//! Reads go straight to the store and may run from many workers at once.
//! Writes are only ever staged into a [`WriteBatch`]; nothing here mutates
//! the store except [`UtxoStore::apply`] and [`UtxoStore::seed`].

use crate::domain::batch::WriteBatch;
use crate::domain::errors::StorageError;
use crate::domain::keys::KeyPrefix;
use crate::ports::outbound::KeyValueStore;
use shared_types::{Hash, UnspentOutputRecord};
use std::sync::Arc;
use tracing::debug;

/// Repository of unspent outputs over a [`KeyValueStore`].
#[derive(Clone)]
pub struct UtxoStore {
    kv: Arc<dyn KeyValueStore>,
}

impl UtxoStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The underlying store.
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Look up the record for `output_hash`.
    ///
    /// A value that is present but does not decode is reported as
    /// `StorageError::Corruption`.
    pub fn get(&self, output_hash: &Hash) -> Result<Option<UnspentOutputRecord>, StorageError> {
        let key = KeyPrefix::UnspentOutput.key(output_hash);
        match self.kv.get(&key)? {
            Some(bytes) => decode_record(output_hash, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, output_hash: &Hash) -> Result<bool, StorageError> {
        let key = KeyPrefix::UnspentOutput.key(output_hash);
        Ok(self.kv.exists(&key)?)
    }

    /// Stage creation of a record.
    pub fn stage_create(
        batch: &mut WriteBatch,
        output_hash: &Hash,
        record: &UnspentOutputRecord,
    ) -> Result<(), StorageError> {
        let value = bincode::serialize(record).map_err(|e| StorageError::SerializationError {
            message: e.to_string(),
        })?;
        batch.put(KeyPrefix::UnspentOutput.key(output_hash), value);
        Ok(())
    }

    /// Stage removal of a spent record.
    pub fn stage_spend(batch: &mut WriteBatch, output_hash: &Hash) {
        batch.delete(KeyPrefix::UnspentOutput.key(output_hash));
    }

    /// Apply a staged batch atomically.
    pub fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let operations = batch.len();
        self.kv.put_batch(batch)?;
        debug!(operations, "Applied UTXO batch");
        Ok(())
    }

    /// Insert initial records (genesis allocation, test fixtures) in one batch.
    pub fn seed(
        &self,
        records: impl IntoIterator<Item = (Hash, UnspentOutputRecord)>,
    ) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        for (output_hash, record) in records {
            Self::stage_create(&mut batch, &output_hash, &record)?;
        }
        self.apply(batch)
    }

    /// Every record, in ascending key order.
    pub fn all(&self) -> Result<Vec<(Hash, UnspentOutputRecord)>, StorageError> {
        let prefix = KeyPrefix::UnspentOutput;
        self.kv
            .iterate_ordered(prefix.as_bytes())?
            .into_iter()
            .map(|(key, value)| {
                let output_hash = prefix.body(&key).ok_or_else(|| StorageError::Corruption {
                    key: [0u8; 32],
                    message: format!("malformed UTXO key of {} bytes", key.len()),
                })?;
                decode_record(&output_hash, &value).map(|record| (output_hash, record))
            })
            .collect()
    }
}

fn decode_record(output_hash: &Hash, bytes: &[u8]) -> Result<UnspentOutputRecord, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Corruption {
        key: *output_hash,
        message: e.to_string(),
    })
}
