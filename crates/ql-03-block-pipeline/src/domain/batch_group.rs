//! # Write Batch Group
//!
//! One pre-allocated slot per commit leaf. Leaves stage into their own slot
//! concurrently; the group is drained in slot order into the single batch
//! that is flushed.

use super::errors::PipelineError;
use parking_lot::Mutex;
use ql_01_ledger_storage::WriteBatch;

pub struct WriteBatchGroup {
    slots: Box<[Mutex<Option<WriteBatch>>]>,
}

impl WriteBatchGroup {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store the batch of the leaf owning `slot`. Each slot is staged once.
    pub fn stage(&self, slot: usize, batch: WriteBatch) -> Result<(), PipelineError> {
        let cell = self.slots.get(slot).ok_or(PipelineError::SlotOutOfRange {
            slot,
            len: self.slots.len(),
        })?;
        let mut guard = cell.lock();
        if guard.is_some() {
            return Err(PipelineError::SlotOccupied { slot });
        }
        *guard = Some(batch);
        Ok(())
    }

    pub fn staged_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Take every slot's batch, in slot order, as one batch.
    ///
    /// Fails if any slot was never staged; the group is left empty either way.
    pub fn drain(&self) -> Result<WriteBatch, PipelineError> {
        let mut combined = WriteBatch::new();
        let mut missing = None;
        for (slot, cell) in self.slots.iter().enumerate() {
            match cell.lock().take() {
                Some(batch) => combined.append(batch),
                None => {
                    missing.get_or_insert(slot);
                }
            }
        }
        match missing {
            Some(slot) => Err(PipelineError::IncompleteGroup { slot }),
            None => Ok(combined),
        }
    }
}
