use bytes::Bytes;
use pith_types::BlockHash;

use crate::block::{BlockInfo, PutOutcome, ReclaimReport};
use crate::error::StoreResult;

/// Raw byte storage keyed by block hash.
///
/// Backends know nothing about reference counts; they store, fetch, and
/// delete immutable byte strings.
pub trait BlockBackend: Send + Sync {
    /// Store bytes for a hash. Writing an existing hash is a no-op.
    ///
    /// The bytes must be durable (per the backend's sync policy) before this
    /// returns, and a failed write must leave any existing block intact.
    fn write(&self, hash: &BlockHash, data: &Bytes) -> StoreResult<()>;

    /// Read bytes for a hash. Returns `Ok(None)` if absent.
    fn read(&self, hash: &BlockHash) -> StoreResult<Option<Bytes>>;

    /// Delete a block. Returns `true` if it existed.
    fn delete(&self, hash: &BlockHash) -> StoreResult<bool>;

    /// Check whether bytes exist for a hash.
    fn exists(&self, hash: &BlockHash) -> StoreResult<bool>;

    /// Every stored block with its size in bytes.
    fn list(&self) -> StoreResult<Vec<(BlockHash, u64)>>;
}

/// Reference-counted, deduplicating block store.
///
/// All implementations must satisfy these invariants:
/// - A block's count equals the number of live references to it.
/// - Bytes are durable before a block's count first becomes non-zero.
/// - Dropping to zero never deletes; only `reclaim` deletes.
/// - Operations on the same hash are linearizable.
pub trait BlockStore: Send + Sync {
    /// Add one reference to a block, writing its bytes if it is new.
    fn put(&self, hash: &BlockHash, data: Bytes) -> StoreResult<PutOutcome>;

    /// Fetch exactly the bytes stored for a hash.
    fn get(&self, hash: &BlockHash) -> StoreResult<Bytes>;

    /// Add `n` references to an existing block. Returns the new count.
    fn incref(&self, hash: &BlockHash, n: u64) -> StoreResult<u64>;

    /// Drop `n` references. Returns the new count.
    fn decref(&self, hash: &BlockHash, n: u64) -> StoreResult<u64>;

    /// Size and count of a block, if known.
    fn stat(&self, hash: &BlockHash) -> StoreResult<Option<BlockInfo>>;

    /// Delete every block whose count is zero.
    fn reclaim(&self) -> StoreResult<ReclaimReport>;

    /// Check whether a block is known to the store.
    fn contains(&self, hash: &BlockHash) -> StoreResult<bool> {
        Ok(self.stat(hash)?.is_some())
    }
}
