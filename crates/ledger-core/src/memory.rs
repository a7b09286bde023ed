use crate::{
    chain::{ChainStore, StoreError},
    Block,
};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// In-process `ChainStore` with the same uniqueness rules as the persistent backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    blocks: BTreeMap<u64, Block>,
    hashes: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }
}

impl ChainStore for MemoryStore {
    fn append(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.blocks.contains_key(&block.index) || inner.hashes.contains(&block.hash) {
            return Err(StoreError::Conflict { index: block.index });
        }
        inner.hashes.insert(block.hash.clone());
        inner.blocks.insert(block.index, block.clone());
        Ok(())
    }

    fn get_block(&self, index: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.read()?.blocks.get(&index).cloned())
    }

    fn head(&self) -> Result<Option<Block>, StoreError> {
        Ok(self
            .read()?
            .blocks
            .last_key_value()
            .map(|(_, block)| block.clone()))
    }

    fn blocks(&self) -> Result<Vec<Block>, StoreError> {
        Ok(self.read()?.blocks.values().cloned().collect())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
