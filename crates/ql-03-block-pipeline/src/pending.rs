//! Bodies of blocks whose headers are (or may soon be) under consensus.
//!
//! Proposals carry headers only; the pipelines look the body up here by
//! header hash.

use parking_lot::RwLock;
use shared_types::{Block, Hash};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct PendingBlockPool {
    blocks: Arc<RwLock<HashMap<Hash, Arc<Block>>>>,
}

impl PendingBlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block body; replaces any body with the same hash.
    pub fn insert(&self, block: Block) -> Arc<Block> {
        let block = Arc::new(block);
        self.blocks.write().insert(block.hash(), Arc::clone(&block));
        block
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.read().get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.read().contains_key(hash)
    }

    pub fn remove(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.write().remove(hash)
    }

    /// Drop every body at or below `height` (already decided).
    pub fn prune_through(&self, height: u64) -> usize {
        let mut blocks = self.blocks.write();
        let before = blocks.len();
        blocks.retain(|_, block| block.header.height > height);
        before - blocks.len()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}
