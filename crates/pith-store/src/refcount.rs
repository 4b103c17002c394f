use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use pith_crypto::BlockHasher;
use pith_types::BlockHash;
use tracing::{debug, error, info, warn};

use crate::block::{BlockInfo, IntegrityPolicy, PutOutcome, ReclaimReport};
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockBackend, BlockStore};

/// Number of lock stripes in the reference table.
const STRIPES: usize = 64;

#[derive(Clone, Copy, Debug)]
struct BlockEntry {
    size: u64,
    refcount: u64,
}

type Stripe = HashMap<BlockHash, BlockEntry>;

/// Block store with a striped reference table over a byte backend.
///
/// Each hash maps to one stripe; every table mutation for that hash happens
/// under the stripe's mutex, including the backend write for a new block and
/// the delete during reclamation. Block reads go straight to the backend.
pub struct RefCountedBlockStore<B> {
    backend: B,
    policy: IntegrityPolicy,
    stripes: Vec<Mutex<Stripe>>,
}

impl<B: BlockBackend> RefCountedBlockStore<B> {
    /// Build a store over `backend`, registering every block the backend
    /// already holds with a reference count of zero.
    pub fn new(backend: B, policy: IntegrityPolicy) -> StoreResult<Self> {
        let store = Self {
            backend,
            policy,
            stripes: (0..STRIPES).map(|_| Mutex::new(HashMap::new())).collect(),
        };
        let existing = store.backend.list()?;
        let count = existing.len();
        for (hash, size) in existing {
            store
                .stripe(&hash)?
                .insert(hash, BlockEntry { size, refcount: 0 });
        }
        if count > 0 {
            info!(blocks = count, "registered existing blocks");
        }
        Ok(store)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> IntegrityPolicy {
        self.policy
    }

    /// Number of blocks in the reference table.
    pub fn block_count(&self) -> StoreResult<u64> {
        self.fold(|entries| entries.len() as u64)
    }

    /// Total size of all blocks in the reference table.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        self.fold(|entries| entries.values().map(|e| e.size).sum())
    }

    fn fold(&self, f: impl Fn(&Stripe) -> u64) -> StoreResult<u64> {
        let mut total = 0;
        for stripe in &self.stripes {
            total += f(&*stripe.lock().map_err(|_| StoreError::LockPoisoned)?);
        }
        Ok(total)
    }

    fn stripe(&self, hash: &BlockHash) -> StoreResult<MutexGuard<'_, Stripe>> {
        let index = hash.as_bytes()[0] as usize % STRIPES;
        self.stripes[index]
            .lock()
            .map_err(|_| StoreError::LockPoisoned)
    }

    fn verify(&self, hash: &BlockHash, data: &[u8], context: &str) -> StoreResult<()> {
        if self.policy == IntegrityPolicy::Verify && !BlockHasher::BLOCK.verify(data, hash) {
            error!(hash = %hash, size = data.len(), context, "block integrity failure");
            return Err(StoreError::Integrity {
                hash: *hash,
                reason: format!("{context}: bytes do not match hash"),
            });
        }
        Ok(())
    }
}

impl<B: BlockBackend> BlockStore for RefCountedBlockStore<B> {
    fn put(&self, hash: &BlockHash, data: Bytes) -> StoreResult<PutOutcome> {
        self.verify(hash, &data, "put")?;
        let size = data.len() as u64;
        let mut table = self.stripe(hash)?;

        if let Some(entry) = table.get_mut(hash) {
            if entry.size != size {
                error!(hash = %hash, stored = entry.size, offered = size, "block size mismatch");
                return Err(StoreError::Integrity {
                    hash: *hash,
                    reason: format!("stored size {} differs from offered size {size}", entry.size),
                });
            }
            if self.policy == IntegrityPolicy::Verify {
                match self.backend.read(hash)? {
                    Some(stored) if stored == data => {}
                    Some(_) => {
                        error!(hash = %hash, "stored block differs from offered bytes");
                        return Err(StoreError::Integrity {
                            hash: *hash,
                            reason: "stored bytes differ from offered bytes".into(),
                        });
                    }
                    None => {
                        warn!(hash = %hash, "block bytes missing; rewriting");
                        self.backend.write(hash, &data)?;
                    }
                }
            }
            entry.refcount += 1;
            debug!(hash = %hash.short_hex(), refcount = entry.refcount, "block reference added");
            return Ok(PutOutcome {
                refcount: entry.refcount,
                created: false,
            });
        }

        self.backend.write(hash, &data)?;
        table.insert(*hash, BlockEntry { size, refcount: 1 });
        debug!(hash = %hash.short_hex(), size, "block created");
        Ok(PutOutcome {
            refcount: 1,
            created: true,
        })
    }

    fn get(&self, hash: &BlockHash) -> StoreResult<Bytes> {
        let data = self
            .backend
            .read(hash)?
            .ok_or(StoreError::NotFound(*hash))?;
        self.verify(hash, &data, "get")?;
        Ok(data)
    }

    fn incref(&self, hash: &BlockHash, n: u64) -> StoreResult<u64> {
        let mut table = self.stripe(hash)?;
        let entry = table.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        entry.refcount = entry.refcount.saturating_add(n);
        Ok(entry.refcount)
    }

    fn decref(&self, hash: &BlockHash, n: u64) -> StoreResult<u64> {
        let mut table = self.stripe(hash)?;
        let entry = table.get_mut(hash).ok_or(StoreError::NotFound(*hash))?;
        if n > entry.refcount {
            return Err(StoreError::InvalidRefcount {
                hash: *hash,
                current: entry.refcount,
                requested: n,
            });
        }
        entry.refcount -= n;
        debug!(hash = %hash.short_hex(), refcount = entry.refcount, "block reference dropped");
        Ok(entry.refcount)
    }

    fn stat(&self, hash: &BlockHash) -> StoreResult<Option<BlockInfo>> {
        let table = self.stripe(hash)?;
        Ok(table.get(hash).map(|e| BlockInfo {
            size: e.size,
            refcount: e.refcount,
        }))
    }

    fn reclaim(&self) -> StoreResult<ReclaimReport> {
        let mut report = ReclaimReport::default();
        for stripe in &self.stripes {
            let mut table = stripe.lock().map_err(|_| StoreError::LockPoisoned)?;
            report.examined += table.len() as u64;

            let unreferenced: Vec<(BlockHash, u64)> = table
                .iter()
                .filter(|(_, e)| e.refcount == 0)
                .map(|(h, e)| (*h, e.size))
                .collect();
            for (hash, size) in unreferenced {
                self.backend.delete(&hash)?;
                table.remove(&hash);
                report.reclaimed += 1;
                report.bytes_freed += size;
            }
        }
        info!(
            examined = report.examined,
            reclaimed = report.reclaimed,
            bytes_freed = report.bytes_freed,
            "block reclamation finished"
        );
        Ok(report)
    }
}

impl<B: BlockBackend + std::fmt::Debug> std::fmt::Debug for RefCountedBlockStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCountedBlockStore")
            .field("backend", &self.backend)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FsBackend, FsyncPolicy};
    use crate::memory::MemoryBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn block(data: &'static [u8]) -> (BlockHash, Bytes) {
        (BlockHasher::BLOCK.hash(data), Bytes::from_static(data))
    }

    fn memory_store() -> RefCountedBlockStore<MemoryBackend> {
        RefCountedBlockStore::new(MemoryBackend::new(), IntegrityPolicy::Verify).unwrap()
    }

    // -----------------------------------------------------------------------
    // put / get
    // -----------------------------------------------------------------------

    #[test]
    fn put_twice_counts_two_references() {
        let store = memory_store();
        let (h, data) = block(b"shared block");

        let first = store.put(&h, data.clone()).unwrap();
        assert_eq!(first, PutOutcome { refcount: 1, created: true });
        let second = store.put(&h, data.clone()).unwrap();
        assert_eq!(second, PutOutcome { refcount: 2, created: false });

        assert_eq!(store.get(&h).unwrap(), data);
        assert_eq!(store.stat(&h).unwrap(), Some(BlockInfo { size: 12, refcount: 2 }));
        assert_eq!(store.backend().len(), 1);
    }

    #[test]
    fn put_rejects_wrong_hash_under_verify() {
        let store = memory_store();
        let wrong = BlockHasher::BLOCK.hash(b"something else");
        let err = store.put(&wrong, Bytes::from_static(b"actual")).unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
        assert!(!store.contains(&wrong).unwrap());
    }

    #[test]
    fn trust_hash_skips_verification() {
        let store =
            RefCountedBlockStore::new(MemoryBackend::new(), IntegrityPolicy::TrustHash).unwrap();
        let label = BlockHash::from_bytes(b"label");
        store.put(&label, Bytes::from_static(b"anything")).unwrap();
        assert_eq!(&store.get(&label).unwrap()[..], b"anything");
    }

    #[test]
    fn get_detects_corruption() {
        let store = memory_store();
        let (h, data) = block(b"pristine");
        store.put(&h, data).unwrap();
        store.backend().corrupt(&h, Bytes::from_static(b"rotten")).unwrap();
        assert!(matches!(store.get(&h), Err(StoreError::Integrity { .. })));
    }

    #[test]
    fn duplicate_put_detects_corrupt_stored_copy() {
        let store = memory_store();
        let (h, data) = block(b"pristine");
        store.put(&h, data.clone()).unwrap();
        store.backend().corrupt(&h, Bytes::from_static(b"rotten!!")).unwrap();

        assert!(matches!(
            store.put(&h, data),
            Err(StoreError::Integrity { .. })
        ));
        assert_eq!(store.stat(&h).unwrap().unwrap().refcount, 1);
    }

    #[test]
    fn duplicate_put_rewrites_missing_bytes() {
        let store = memory_store();
        let (h, data) = block(b"vanishing");
        store.put(&h, data.clone()).unwrap();
        store.backend().delete(&h).unwrap();

        assert_eq!(store.put(&h, data.clone()).unwrap().refcount, 2);
        assert_eq!(store.get(&h).unwrap(), data);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = memory_store();
        let (h, _) = block(b"absent");
        assert!(matches!(store.get(&h), Err(StoreError::NotFound(_))));
        assert!(store.stat(&h).unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // reference counting
    // -----------------------------------------------------------------------

    #[test]
    fn decref_below_zero_rejected() {
        let store = memory_store();
        let (h, data) = block(b"counted");
        store.put(&h, data).unwrap();
        assert_eq!(store.incref(&h, 2).unwrap(), 3);
        let err = store.decref(&h, 4).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidRefcount { current: 3, requested: 4, .. }
        ));
        assert_eq!(store.decref(&h, 3).unwrap(), 0);
    }

    #[test]
    fn zero_count_does_not_delete_until_reclaim() {
        let store = memory_store();
        let (h, data) = block(b"lazy");
        store.put(&h, data).unwrap();
        store.decref(&h, 1).unwrap();
        assert!(store.get(&h).is_ok());

        let report = store.reclaim().unwrap();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.bytes_freed, 4);
        assert!(matches!(store.get(&h), Err(StoreError::NotFound(_))));
        assert!(!store.contains(&h).unwrap());
    }

    #[test]
    fn reclaim_keeps_referenced_blocks() {
        let store = memory_store();
        let (live, live_data) = block(b"live");
        let (dead, dead_data) = block(b"dead");
        store.put(&live, live_data).unwrap();
        store.put(&dead, dead_data).unwrap();
        store.decref(&dead, 1).unwrap();

        let report = store.reclaim().unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.reclaimed, 1);
        assert!(store.contains(&live).unwrap());
        assert_eq!(store.block_count().unwrap(), 1);
        assert_eq!(store.total_bytes().unwrap(), 4);
    }

    #[test]
    fn reput_after_reclaim_recreates() {
        let store = memory_store();
        let (h, data) = block(b"phoenix");
        store.put(&h, data.clone()).unwrap();
        store.decref(&h, 1).unwrap();
        store.reclaim().unwrap();
        let outcome = store.put(&h, data).unwrap();
        assert!(outcome.created);
    }

    // -----------------------------------------------------------------------
    // concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_identical_puts_store_one_copy() {
        let store = Arc::new(memory_store());
        let (h, data) = block(b"raced block");

        std::thread::scope(|s| {
            for _ in 0..2 {
                let store = Arc::clone(&store);
                let data = data.clone();
                s.spawn(move || store.put(&h, data).unwrap());
            }
        });

        assert_eq!(store.stat(&h).unwrap().unwrap().refcount, 2);
        assert_eq!(store.backend().len(), 1);
    }

    #[test]
    fn many_threads_count_exactly() {
        let store = Arc::new(memory_store());
        let (h, data) = block(b"hot block");

        std::thread::scope(|s| {
            for _ in 0..16 {
                let store = Arc::clone(&store);
                let data = data.clone();
                s.spawn(move || {
                    for _ in 0..10 {
                        store.put(&h, data.clone()).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.stat(&h).unwrap().unwrap().refcount, 160);
    }

    // -----------------------------------------------------------------------
    // filesystem backend
    // -----------------------------------------------------------------------

    #[test]
    fn reopen_registers_blocks_with_zero_references() {
        let dir = TempDir::new().unwrap();
        let (h, data) = block(b"orphan after crash");
        {
            let backend = FsBackend::open(dir.path(), FsyncPolicy::Always).unwrap();
            let store = RefCountedBlockStore::new(backend, IntegrityPolicy::Verify).unwrap();
            store.put(&h, data.clone()).unwrap();
        }

        let backend = FsBackend::open(dir.path(), FsyncPolicy::Always).unwrap();
        let store = RefCountedBlockStore::new(backend, IntegrityPolicy::Verify).unwrap();
        assert_eq!(
            store.stat(&h).unwrap(),
            Some(BlockInfo { size: data.len() as u64, refcount: 0 })
        );

        let report = store.reclaim().unwrap();
        assert_eq!(report.reclaimed, 1);
        assert!(!store.backend().block_path(&h).exists());
    }

    #[test]
    fn fs_store_dedups() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::open(dir.path(), FsyncPolicy::Never).unwrap();
        let store = RefCountedBlockStore::new(backend, IntegrityPolicy::Verify).unwrap();
        let (h, data) = block(b"dedup me");
        store.put(&h, data.clone()).unwrap();
        store.put(&h, data).unwrap();
        assert_eq!(store.backend().list().unwrap().len(), 1);
        assert_eq!(store.stat(&h).unwrap().unwrap().refcount, 2);
    }
}
