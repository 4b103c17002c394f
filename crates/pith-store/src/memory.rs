use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use pith_types::BlockHash;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockBackend;

/// In-memory, HashMap-based byte backend.
///
/// Intended for tests and embedding. `Bytes` values are reference counted,
/// so reads do not copy block contents.
pub struct MemoryBackend {
    blocks: RwLock<HashMap<BlockHash, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the bytes stored for a hash without any checks.
    ///
    /// Simulates on-disk corruption in tests.
    #[doc(hidden)]
    pub fn corrupt(&self, hash: &BlockHash, data: Bytes) -> StoreResult<()> {
        let mut map = self.blocks.write().map_err(|_| StoreError::LockPoisoned)?;
        map.insert(*hash, data);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBackend for MemoryBackend {
    fn write(&self, hash: &BlockHash, data: &Bytes) -> StoreResult<()> {
        let mut map = self.blocks.write().map_err(|_| StoreError::LockPoisoned)?;
        map.entry(*hash).or_insert_with(|| data.clone());
        Ok(())
    }

    fn read(&self, hash: &BlockHash) -> StoreResult<Option<Bytes>> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(hash).cloned())
    }

    fn delete(&self, hash: &BlockHash) -> StoreResult<bool> {
        let mut map = self.blocks.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.remove(hash).is_some())
    }

    fn exists(&self, hash: &BlockHash) -> StoreResult<bool> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(hash))
    }

    fn list(&self) -> StoreResult<Vec<(BlockHash, u64)>> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut out: Vec<(BlockHash, u64)> = map
            .iter()
            .map(|(hash, data)| (*hash, data.len() as u64))
            .collect();
        out.sort();
        Ok(out)
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("block_count", &self.len())
            .finish()
    }
}
