use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use pith_crypto::Chunker;
use pith_index::{
    IndexError, InMemoryVersionIndex, NewVersion, ObjectMeta, PurgeScope, Version, VersionIndex,
    VersionSelector,
};
use pith_quota::{
    AccountingPolicy, InMemoryQuotaLedger, QuotaLedger, QuotaLimits, QuotaScope, Usage, UsageDelta,
};
use pith_store::{
    BlockStore, FsBackend, MemoryBackend, ReclaimReport, RefCountedBlockStore, StoreError,
};
use pith_types::{BlockHash, Hashmap, ObjectPath, Timestamp, VersioningPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::events::{NullSink, UsageEvent, UsageEventKind, UsageSink};
use crate::journal::{Journal, JournalEntry, JournalRecord};
use crate::locks::PathLocks;
use crate::public::PublicRegistry;
use crate::replay::{replay, ReplayReport};
use crate::txn::CommitTxn;

/// Versions removed by a purge and what they were worth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Purged serials, oldest first.
    pub serials: Vec<u64>,
    /// Bytes held by the purged versions.
    pub bytes: u64,
    /// Usage change applied to the ledger.
    pub delta: UsageDelta,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.serials.is_empty()
    }
}

/// Object store backend.
///
/// Composes the block store, version index, and quota ledger, and runs
/// every mutation through a [`CommitTxn`]. All methods are synchronous and
/// may block on I/O or on the per-path commit lock.
pub struct Backend {
    config: BackendConfig,
    chunker: Chunker,
    policy: AccountingPolicy,
    blocks: Arc<dyn BlockStore>,
    index: Arc<dyn VersionIndex>,
    ledger: Arc<dyn QuotaLedger>,
    journal: Option<Journal>,
    public: PublicRegistry,
    locks: PathLocks,
    sink: Arc<dyn UsageSink>,
    recovery: ReplayReport,
}

impl Backend {
    /// A backend with memory-resident stores and no journal.
    pub fn in_memory(config: BackendConfig) -> BackendResult<Self> {
        let blocks = RefCountedBlockStore::new(MemoryBackend::new(), config.integrity)?;
        let ledger = InMemoryQuotaLedger::new(config.ledger_defaults());
        Self::from_parts(
            config,
            Arc::new(blocks),
            Arc::new(InMemoryVersionIndex::new()),
            Arc::new(ledger),
        )
    }

    /// A backend over caller-supplied stores, without a journal.
    pub fn from_parts(
        config: BackendConfig,
        blocks: Arc<dyn BlockStore>,
        index: Arc<dyn VersionIndex>,
        ledger: Arc<dyn QuotaLedger>,
    ) -> BackendResult<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.block_size)?;
        Ok(Self {
            chunker,
            policy: config.accounting_policy(),
            public: PublicRegistry::new(
                config.public_url_security,
                config.public_url_alphabet.clone(),
            ),
            config,
            blocks,
            index,
            ledger,
            journal: None,
            locks: PathLocks::new(),
            sink: Arc::new(NullSink),
            recovery: ReplayReport::default(),
        })
    }

    /// Open a backend as configured, replaying the journal if there is one.
    ///
    /// Blocks found on disk start with no references; replay restores the
    /// references of journaled versions. Whatever stays unreferenced is
    /// removed by the next [`reclaim_blocks`](Self::reclaim_blocks).
    pub fn open(config: BackendConfig) -> BackendResult<Self> {
        config.validate()?;
        let blocks: Arc<dyn BlockStore> = match &config.block_path {
            Some(root) => Arc::new(RefCountedBlockStore::new(
                FsBackend::open(root, config.fsync)?,
                config.integrity,
            )?),
            None => Arc::new(RefCountedBlockStore::new(
                MemoryBackend::new(),
                config.integrity,
            )?),
        };
        let ledger = Arc::new(InMemoryQuotaLedger::new(config.ledger_defaults()));
        let journal_path = config.journal_path.clone();
        let sync = config.journal_sync;

        let mut backend =
            Self::from_parts(config, blocks, Arc::new(InMemoryVersionIndex::new()), ledger)?;

        if let Some(path) = journal_path {
            let journal = Journal::open(&path, sync)?;
            let entries = journal.recover()?;
            backend.recovery = replay(
                &entries,
                &*backend.blocks,
                &*backend.index,
                &*backend.ledger,
                &backend.public,
            )?;
            backend.journal = Some(journal);
            info!(journal = %path.display(), "backend opened");
        } else {
            info!("backend opened without journal");
        }
        Ok(backend)
    }

    /// Install a usage event consumer.
    pub fn with_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// What journal replay restored when the backend was opened.
    pub fn recovery(&self) -> &ReplayReport {
        &self.recovery
    }

    pub fn blocks(&self) -> &dyn BlockStore {
        &*self.blocks
    }

    pub fn index(&self) -> &dyn VersionIndex {
        &*self.index
    }

    pub fn ledger(&self) -> &dyn QuotaLedger {
        &*self.ledger
    }

    // ---- Writes ----

    /// Chunk `reader` into blocks and commit them as a new version.
    pub fn put_object<R: Read>(
        &self,
        path: &ObjectPath,
        reader: R,
        meta: ObjectMeta,
    ) -> BackendResult<Version> {
        path.validate()?;
        let mut txn = self.begin();
        let mut hashmap = Hashmap::empty();
        let mut size = 0u64;
        for chunk in self.chunker.chunks(reader) {
            let chunk = chunk?;
            size += chunk.len() as u64;
            hashmap.push(chunk.hash);
            txn.put_block(&chunk.hash, chunk.data)?;
        }
        txn.blocks_written()?;
        debug!(path = %path, blocks = hashmap.len(), size, "object blocks written");
        self.commit_version(
            txn,
            NewVersion::object(path.clone(), hashmap, size, meta),
            UsageEventKind::Write,
        )
    }

    /// Commit a version made of blocks that are already stored.
    ///
    /// Fails with `MissingBlocks` listing every unknown hash, and with
    /// `InvalidArgument` if `size` is not the sum of the block sizes.
    pub fn put_object_hashmap(
        &self,
        path: &ObjectPath,
        hashmap: Hashmap,
        size: u64,
        meta: ObjectMeta,
    ) -> BackendResult<Version> {
        path.validate()?;
        self.check_hashmap(&hashmap, size)?;
        self.commit_hashmap(NewVersion::object(path.clone(), hashmap, size, meta))
    }

    /// Copy the current version of `src` to `dst`, sharing its blocks.
    pub fn copy_object(&self, src: &ObjectPath, dst: &ObjectPath) -> BackendResult<Version> {
        dst.validate()?;
        let source = self.index.get_version(src, VersionSelector::Current)?;
        self.commit_hashmap(NewVersion::object(
            dst.clone(),
            source.hashmap,
            source.size,
            source.meta,
        ))
    }

    /// Commit a new version with the same content and different metadata.
    pub fn update_object_meta(&self, path: &ObjectPath, meta: ObjectMeta) -> BackendResult<Version> {
        let current = self.index.get_version(path, VersionSelector::Current)?;
        self.commit_hashmap(NewVersion::object(
            path.clone(),
            current.hashmap,
            current.size,
            meta,
        ))
    }

    /// Append a tombstone. The object must currently exist.
    pub fn delete_object(&self, path: &ObjectPath) -> BackendResult<Version> {
        path.validate()?;
        let mut txn = self.begin();
        txn.blocks_written()?;
        self.commit_version(txn, NewVersion::tombstone(path.clone()), UsageEventKind::Delete)
    }

    fn begin(&self) -> CommitTxn<'_> {
        CommitTxn::begin(&*self.blocks, &*self.ledger)
    }

    fn check_hashmap(&self, hashmap: &Hashmap, size: u64) -> BackendResult<()> {
        let mut missing = Vec::new();
        let mut total = 0u64;
        for (hash, n) in hashmap.occurrences() {
            match self.blocks.stat(&hash)? {
                Some(info) => total += info.size * n,
                None => missing.push(hash),
            }
        }
        if !missing.is_empty() {
            return Err(BackendError::MissingBlocks(missing));
        }
        if total != size {
            return Err(BackendError::InvalidArgument(format!(
                "size {size} does not match block total {total}"
            )));
        }
        Ok(())
    }

    fn commit_hashmap(&self, new: NewVersion) -> BackendResult<Version> {
        let mut txn = self.begin();
        for hash in new.hashmap.iter() {
            match txn.ref_block(hash) {
                Ok(()) => {}
                Err(BackendError::NotFound(_)) => {
                    return Err(BackendError::MissingBlocks(vec![*hash]));
                }
                Err(e) => return Err(e),
            }
        }
        txn.blocks_written()?;
        self.commit_version(txn, new, UsageEventKind::Write)
    }

    /// Reserve quota, stage, journal, and publish a version under the path's
    /// commit lock. Any early return drops `txn`, which undoes its block
    /// references and reservation.
    fn commit_version(
        &self,
        mut txn: CommitTxn<'_>,
        new: NewVersion,
        kind: UsageEventKind,
    ) -> BackendResult<Version> {
        let path = new.path.clone();
        let _guard = self.locks.lock(&path)?;

        let mut attempt: u32 = 0;
        let (staged, delta) = loop {
            attempt += 1;
            let head = self.index.head(&path)?;
            let previous_live = head.as_ref().filter(|v| !v.deleted).map(|v| v.size);
            let delta = match (kind, previous_live) {
                (UsageEventKind::Delete, Some(size)) => self.policy.delete_delta(size),
                (UsageEventKind::Delete, None) => {
                    return Err(BackendError::NotFound(format!("{path} (current)")));
                }
                _ => self.policy.write_delta(previous_live, new.size),
            };
            txn.reserve(&path.account, &path.container, delta)?;

            match self
                .index
                .stage_version(new.clone(), head.as_ref().map(|v| v.serial))
            {
                Ok(staged) => break (staged, delta),
                Err(IndexError::Conflict { .. }) if attempt <= self.config.max_commit_retries => {
                    txn.release_reservation()?;
                    warn!(path = %path, attempt, "commit conflict; retrying");
                    thread::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * u64::from(attempt),
                    ));
                }
                Err(IndexError::Conflict { .. }) => {
                    return Err(BackendError::Conflict {
                        path: path.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let entry = JournalEntry::new(
            txn.id(),
            vec![
                JournalRecord::VersionAdded(staged.clone()),
                JournalRecord::UsageApplied {
                    account: path.account.clone(),
                    container: path.container.clone(),
                    delta,
                },
            ],
        );
        if let Err(e) = self.append(&entry) {
            // The journal cuts a failed entry back out; the marker covers a
            // rollback that itself failed.
            self.journal_abort(txn.id());
            self.discard(&path, staged.serial);
            return Err(e);
        }

        let version = match self.index.publish(&path, staged.serial) {
            Ok(version) => version,
            Err(e) => {
                self.journal_abort(txn.id());
                self.discard(&path, staged.serial);
                return Err(e.into());
            }
        };
        let txn_id = txn.commit()?;
        info!(
            path = %path,
            serial = version.serial,
            size = version.size,
            deleted = version.deleted,
            txn = %txn_id,
            "version committed"
        );

        if kind == UsageEventKind::Delete {
            if let Err(e) = self.clear_public_locked(&path) {
                warn!(path = %path, error = %e, "failed to clear public token of deleted object");
            }
        }
        self.apply_retention(&path);

        self.sink.emit(UsageEvent {
            kind,
            path,
            serial: Some(version.serial),
            delta,
            at: version.modified,
        });
        Ok(version)
    }

    fn discard(&self, path: &ObjectPath, serial: u64) {
        if let Err(e) = self.index.discard(path, serial) {
            error!(path = %path, serial, error = %e, "failed to discard staged version");
        }
    }

    fn journal_abort(&self, txn: Uuid) {
        let abort = JournalEntry::new(txn, vec![JournalRecord::Aborted { txn }]);
        if let Err(e) = self.append(&abort) {
            error!(txn = %txn, error = %e, "failed to journal abort");
        }
    }

    fn append(&self, entry: &JournalEntry) -> BackendResult<()> {
        match &self.journal {
            Some(journal) => {
                journal.append(entry)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn apply_retention(&self, path: &ObjectPath) {
        let scope = match (self.config.versioning, self.config.max_versions) {
            (VersioningPolicy::None, _) => PurgeScope::AllButCurrent,
            (VersioningPolicy::Auto, Some(max)) => PurgeScope::KeepLatest(max),
            _ => return,
        };
        if let Err(e) = self.purge_locked(path, scope) {
            warn!(path = %path, error = %e, "version retention failed");
        }
    }

    // ---- Reads ----

    /// Fetch a version and its full content.
    pub fn get_object(
        &self,
        path: &ObjectPath,
        selector: VersionSelector,
    ) -> BackendResult<(Version, Bytes)> {
        let version = self.index.get_version(path, selector)?;
        let mut buf = BytesMut::with_capacity(usize::try_from(version.size).unwrap_or(0));
        for hash in version.hashmap.iter() {
            buf.extend_from_slice(&self.fetch_block(hash)?);
        }
        if buf.len() as u64 != version.size {
            error!(path = %path, serial = version.serial, expected = version.size, actual = buf.len(), "object size mismatch");
            return Err(BackendError::Integrity(format!(
                "{path} serial {}: expected {} bytes, read {}",
                version.serial,
                version.size,
                buf.len()
            )));
        }
        Ok((version, buf.freeze()))
    }

    /// Stream a version's content into `out`, block by block.
    pub fn read_object<W: Write>(
        &self,
        path: &ObjectPath,
        selector: VersionSelector,
        mut out: W,
    ) -> BackendResult<Version> {
        let version = self.index.get_version(path, selector)?;
        for hash in version.hashmap.iter() {
            let block = self.fetch_block(hash)?;
            out.write_all(&block)
                .map_err(|e| BackendError::StorageIo(e.to_string()))?;
        }
        out.flush().map_err(|e| BackendError::StorageIo(e.to_string()))?;
        Ok(version)
    }

    pub fn get_object_meta(
        &self,
        path: &ObjectPath,
        selector: VersionSelector,
    ) -> BackendResult<Version> {
        Ok(self.index.get_version(path, selector)?)
    }

    pub fn get_object_hashmap(
        &self,
        path: &ObjectPath,
        selector: VersionSelector,
    ) -> BackendResult<(Hashmap, u64)> {
        let version = self.index.get_version(path, selector)?;
        Ok((version.hashmap, version.size))
    }

    pub fn list_versions(&self, path: &ObjectPath) -> BackendResult<Vec<Version>> {
        Ok(self.index.list_versions(path)?)
    }

    pub fn list_objects(&self, account: &str, container: &str) -> BackendResult<Vec<Version>> {
        Ok(self.index.list_objects(account, container)?)
    }

    pub fn list_containers(&self, account: &str) -> BackendResult<Vec<String>> {
        Ok(self.index.list_containers(account)?)
    }

    fn fetch_block(&self, hash: &BlockHash) -> BackendResult<Bytes> {
        match self.blocks.get(hash) {
            Ok(bytes) => Ok(bytes),
            Err(e @ StoreError::Integrity { .. }) => {
                error!(hash = %hash.short_hex(), error = %e, "block failed integrity check");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---- Quota ----

    pub fn usage(&self, scope: &QuotaScope) -> BackendResult<Usage> {
        Ok(self.ledger.usage(scope)?)
    }

    pub fn limits(&self, scope: &QuotaScope) -> BackendResult<QuotaLimits> {
        Ok(self.ledger.limits(scope)?)
    }

    pub fn set_limits(&self, scope: &QuotaScope, limits: QuotaLimits) -> BackendResult<()> {
        self.append(&JournalEntry::new(
            Uuid::now_v7(),
            vec![JournalRecord::LimitsSet {
                scope: scope.clone(),
                limits,
            }],
        ))?;
        self.ledger.set_limits(scope, limits)?;
        info!(scope = %scope, max_bytes = ?limits.max_bytes, max_objects = ?limits.max_objects, "limits set");
        Ok(())
    }

    // ---- Garbage collection ----

    /// Remove historical versions, drop their block references, and give
    /// their quota back.
    pub fn purge_history(&self, path: &ObjectPath, scope: PurgeScope) -> BackendResult<PurgeReport> {
        path.validate()?;
        let _guard = self.locks.lock(path)?;
        self.purge_locked(path, scope)
    }

    fn purge_locked(&self, path: &ObjectPath, scope: PurgeScope) -> BackendResult<PurgeReport> {
        let current = match self.index.get_version(path, VersionSelector::Current) {
            Ok(version) => Some(version),
            Err(IndexError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let removed = self.index.purge(path, scope)?;
        if removed.is_empty() {
            return Ok(PurgeReport::default());
        }

        let current_serial = current.as_ref().map(|c| c.serial);
        let current_removed = removed.iter().any(|v| Some(v.serial) == current_serial);

        let mut history_bytes = 0u64;
        let mut delta = UsageDelta::zero();
        let mut refs: BTreeMap<BlockHash, u64> = BTreeMap::new();
        for version in &removed {
            for (hash, n) in version.hashmap.occurrences() {
                *refs.entry(hash).or_default() += n;
            }
            if version.deleted {
                continue;
            }
            if Some(version.serial) == current_serial {
                delta = delta
                    + self.policy.delete_delta(version.size)
                    + self.policy.purge_delta(version.size);
            } else {
                history_bytes += version.size;
            }
        }
        delta = delta + self.policy.purge_delta(history_bytes);

        let report = PurgeReport {
            serials: removed.iter().map(|v| v.serial).collect(),
            bytes: removed.iter().map(|v| v.size).sum(),
            delta,
        };
        let entry = JournalEntry::new(
            Uuid::now_v7(),
            vec![
                JournalRecord::VersionsPurged {
                    path: path.clone(),
                    serials: report.serials.clone(),
                },
                JournalRecord::UsageApplied {
                    account: path.account.clone(),
                    container: path.container.clone(),
                    delta,
                },
            ],
        );
        if let Err(e) = self.append(&entry) {
            // Ledger and references still count these versions; put them back.
            for version in removed {
                let serial = version.serial;
                if let Err(re) = self.index.restore(version) {
                    error!(path = %path, serial, error = %re, "failed to restore unjournaled purge");
                }
            }
            return Err(e);
        }

        self.ledger.apply(&path.account, &path.container, delta)?;
        for (hash, n) in &refs {
            if let Err(e) = self.blocks.decref(hash, *n) {
                error!(hash = %hash.short_hex(), error = %e, "failed to drop reference of purged version");
            }
        }
        info!(path = %path, versions = report.serials.len(), bytes = report.bytes, "history purged");

        if current_removed {
            if let Err(e) = self.clear_public_locked(path) {
                warn!(path = %path, error = %e, "failed to clear public token of purged object");
            }
        }

        self.sink.emit(UsageEvent {
            kind: UsageEventKind::Purge,
            path: path.clone(),
            serial: None,
            delta,
            at: Timestamp::now(),
        });
        Ok(report)
    }

    /// Delete every block no version references.
    pub fn reclaim_blocks(&self) -> BackendResult<ReclaimReport> {
        let report = self.blocks.reclaim()?;
        info!(
            examined = report.examined,
            reclaimed = report.reclaimed,
            bytes = report.bytes_freed,
            "blocks reclaimed"
        );
        Ok(report)
    }

    // ---- Public URLs ----

    /// Expose the current version of `path` under a random token. Returns
    /// the existing token if the object is already public.
    pub fn set_public(&self, path: &ObjectPath) -> BackendResult<String> {
        let _guard = self.locks.lock(path)?;
        self.index.get_version(path, VersionSelector::Current)?;
        let (token, fresh) = self.public.publish(path)?;
        if fresh {
            let entry = JournalEntry::new(
                Uuid::now_v7(),
                vec![JournalRecord::PublicSet {
                    path: path.clone(),
                    token: token.clone(),
                }],
            );
            if let Err(e) = self.append(&entry) {
                self.public.clear(path)?;
                return Err(e);
            }
            info!(path = %path, "object made public");
        }
        Ok(token)
    }

    /// Withdraw the public token of `path`. Returns whether there was one.
    pub fn clear_public(&self, path: &ObjectPath) -> BackendResult<bool> {
        let _guard = self.locks.lock(path)?;
        self.clear_public_locked(path)
    }

    fn clear_public_locked(&self, path: &ObjectPath) -> BackendResult<bool> {
        if self.public.token(path)?.is_none() {
            return Ok(false);
        }
        self.append(&JournalEntry::new(
            Uuid::now_v7(),
            vec![JournalRecord::PublicCleared { path: path.clone() }],
        ))?;
        self.public.clear(path)?;
        debug!(path = %path, "public token cleared");
        Ok(true)
    }

    pub fn resolve_public(&self, token: &str) -> BackendResult<ObjectPath> {
        self.public
            .resolve(token)?
            .ok_or_else(|| BackendError::NotFound(format!("public token {token}")))
    }

    pub fn public_token(&self, path: &ObjectPath) -> BackendResult<Option<String>> {
        self.public.token(path)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("block_size", &self.config.block_size)
            .field("versioning", &self.config.versioning)
            .field("journal", &self.journal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use pith_crypto::BlockHasher;
    use pith_index::IndexResult;
    use pith_store::{BlockBackend, FsyncPolicy, IntegrityPolicy};

    use crate::events::MemorySink;

    fn config() -> BackendConfig {
        BackendConfig {
            block_size: 4,
            retry_backoff_ms: 1,
            ..BackendConfig::default()
        }
    }

    fn path(name: &str) -> ObjectPath {
        ObjectPath::new("acct", "photos", name).unwrap()
    }

    fn account() -> QuotaScope {
        QuotaScope::Account("acct".into())
    }

    fn refcount(backend: &Backend, data: &[u8]) -> u64 {
        let hash = BlockHasher::BLOCK.hash(data);
        backend.blocks().stat(&hash).unwrap().map(|i| i.refcount).unwrap_or(0)
    }

    fn put(backend: &Backend, name: &str, data: &[u8]) -> BackendResult<Version> {
        backend.put_object(&path(name), data, ObjectMeta::default())
    }

    fn content(backend: &Backend, name: &str, selector: VersionSelector) -> Bytes {
        backend.get_object(&path(name), selector).unwrap().1
    }

    /// Index wrapper that fails the next stage or publish calls on demand.
    #[derive(Default)]
    struct ScriptedIndex {
        inner: InMemoryVersionIndex,
        stage_failures: Mutex<VecDeque<IndexError>>,
        publish_failures: Mutex<VecDeque<IndexError>>,
    }

    impl ScriptedIndex {
        fn fail_stage(&self, e: IndexError) {
            self.stage_failures.lock().unwrap().push_back(e);
        }

        fn fail_publish(&self, e: IndexError) {
            self.publish_failures.lock().unwrap().push_back(e);
        }
    }

    impl VersionIndex for ScriptedIndex {
        fn create_version(&self, new: NewVersion) -> IndexResult<Version> {
            self.inner.create_version(new)
        }

        fn stage_version(&self, new: NewVersion, expected_head: Option<u64>) -> IndexResult<Version> {
            if let Some(e) = self.stage_failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            self.inner.stage_version(new, expected_head)
        }

        fn publish(&self, path: &ObjectPath, serial: u64) -> IndexResult<Version> {
            if let Some(e) = self.publish_failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            self.inner.publish(path, serial)
        }

        fn discard(&self, path: &ObjectPath, serial: u64) -> IndexResult<()> {
            self.inner.discard(path, serial)
        }

        fn get_version(&self, path: &ObjectPath, selector: VersionSelector) -> IndexResult<Version> {
            self.inner.get_version(path, selector)
        }

        fn head(&self, path: &ObjectPath) -> IndexResult<Option<Version>> {
            self.inner.head(path)
        }

        fn list_versions(&self, path: &ObjectPath) -> IndexResult<Vec<Version>> {
            self.inner.list_versions(path)
        }

        fn list_objects(&self, account: &str, container: &str) -> IndexResult<Vec<Version>> {
            self.inner.list_objects(account, container)
        }

        fn list_containers(&self, account: &str) -> IndexResult<Vec<String>> {
            self.inner.list_containers(account)
        }

        fn purge(&self, path: &ObjectPath, scope: PurgeScope) -> IndexResult<Vec<Version>> {
            self.inner.purge(path, scope)
        }

        fn restore(&self, version: Version) -> IndexResult<()> {
            self.inner.restore(version)
        }
    }

    fn scripted(config: BackendConfig) -> (Backend, Arc<ScriptedIndex>) {
        let index = Arc::new(ScriptedIndex::default());
        let blocks =
            RefCountedBlockStore::new(MemoryBackend::new(), config.integrity).unwrap();
        let ledger = InMemoryQuotaLedger::new(config.ledger_defaults());
        let backend = Backend::from_parts(
            config,
            Arc::new(blocks),
            Arc::clone(&index) as Arc<dyn VersionIndex>,
            Arc::new(ledger),
        )
        .unwrap();
        (backend, index)
    }

    fn conflict() -> IndexError {
        IndexError::Conflict {
            path: path("x"),
            expected: None,
            actual: Some(1),
        }
    }

    // ---- Writes and reads ----

    #[test]
    fn put_and_get_roundtrip() {
        let backend = Backend::in_memory(config()).unwrap();
        let v = put(&backend, "a.txt", b"hello world").unwrap();
        assert_eq!(v.serial, 1);
        assert_eq!(v.size, 11);
        assert_eq!(v.hashmap.len(), 3);
        assert_eq!(&content(&backend, "a.txt", VersionSelector::Current)[..], b"hello world");

        let mut out = Vec::new();
        let read = backend
            .read_object(&path("a.txt"), VersionSelector::Current, &mut out)
            .unwrap();
        assert_eq!(read, v);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn empty_object_has_empty_hashmap() {
        let backend = Backend::in_memory(config()).unwrap();
        let v = put(&backend, "empty", b"").unwrap();
        assert!(v.hashmap.is_empty());
        assert_eq!(v.size, 0);
        assert!(content(&backend, "empty", VersionSelector::Current).is_empty());
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 0, objects: 1 });
    }

    #[test]
    fn identical_puts_share_blocks() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "a", b"abcd").unwrap();
        put(&backend, "a", b"abcd").unwrap();
        assert_eq!(refcount(&backend, b"abcd"), 2);
        assert_eq!(&content(&backend, "a", VersionSelector::Current)[..], b"abcd");
        assert_eq!(&content(&backend, "a", VersionSelector::Serial(1))[..], b"abcd");
    }

    #[test]
    fn tombstone_keeps_history_readable() {
        let config = BackendConfig {
            block_size: 1024,
            ..BackendConfig::default()
        };
        let backend = Backend::in_memory(config).unwrap();
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let v1 = backend
            .put_object(&path("doc"), data.as_slice(), ObjectMeta::default())
            .unwrap();
        let h1 = BlockHasher::BLOCK.hash(&data[..1024]);
        let h2 = BlockHasher::BLOCK.hash(&data[1024..]);
        assert_eq!(v1.hashmap.hashes(), &[h1, h2]);

        let tomb = backend.delete_object(&path("doc")).unwrap();
        assert_eq!(tomb.serial, 2);
        assert!(tomb.is_tombstone());

        assert!(matches!(
            backend.get_object(&path("doc"), VersionSelector::Current),
            Err(BackendError::NotFound(_))
        ));
        let (hashmap, size) = backend
            .get_object_hashmap(&path("doc"), VersionSelector::Serial(1))
            .unwrap();
        assert_eq!(hashmap.hashes(), &[h1, h2]);
        assert_eq!(size, 2048);
        assert_eq!(
            &content(&backend, "doc", VersionSelector::Serial(1))[..],
            data.as_slice()
        );
        assert!(backend.list_objects("acct", "photos").unwrap().is_empty());
        assert_eq!(backend.list_versions(&path("doc")).unwrap().len(), 2);
    }

    #[test]
    fn delete_requires_live_object() {
        let backend = Backend::in_memory(config()).unwrap();
        assert!(matches!(
            backend.delete_object(&path("ghost")),
            Err(BackendError::NotFound(_))
        ));
        put(&backend, "once", b"x").unwrap();
        backend.delete_object(&path("once")).unwrap();
        assert!(matches!(
            backend.delete_object(&path("once")),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn hashmap_put_requires_existing_blocks() {
        let backend = Backend::in_memory(config()).unwrap();
        let v = put(&backend, "src", b"abcdefgh").unwrap();

        let ghost = BlockHasher::BLOCK.hash(b"nope");
        let mut bad = v.hashmap.clone();
        bad.push(ghost);
        match backend.put_object_hashmap(&path("dst"), bad, 12, ObjectMeta::default()) {
            Err(BackendError::MissingBlocks(missing)) => assert_eq!(missing, vec![ghost]),
            other => panic!("expected MissingBlocks, got {other:?}"),
        }
        assert!(matches!(
            backend.put_object_hashmap(&path("dst"), v.hashmap.clone(), 7, ObjectMeta::default()),
            Err(BackendError::InvalidArgument(_))
        ));

        let copy = backend
            .put_object_hashmap(&path("dst"), v.hashmap.clone(), 8, ObjectMeta::default())
            .unwrap();
        assert_eq!(copy.etag(), v.etag());
        assert_eq!(refcount(&backend, b"abcd"), 2);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 16, objects: 2 });
    }

    #[test]
    fn copy_and_update_meta_share_content() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "orig", b"wxyz").unwrap();
        let copy = backend.copy_object(&path("orig"), &path("copy")).unwrap();
        assert_eq!(copy.serial, 1);
        assert_eq!(&content(&backend, "copy", VersionSelector::Current)[..], b"wxyz");

        let meta = ObjectMeta::new("text/plain").with("owner", "alice");
        let updated = backend.update_object_meta(&path("copy"), meta.clone()).unwrap();
        assert_eq!(updated.serial, 2);
        assert_eq!(updated.meta, meta);
        assert_eq!(
            backend
                .get_object_meta(&path("copy"), VersionSelector::Current)
                .unwrap()
                .meta,
            meta
        );
        assert_eq!(refcount(&backend, b"wxyz"), 3);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 8, objects: 2 });
        assert!(matches!(
            backend.copy_object(&path("missing"), &path("x")),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn listings() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "b", b"2").unwrap();
        put(&backend, "a", b"1").unwrap();
        let other = ObjectPath::new("acct", "docs", "c").unwrap();
        backend.put_object(&other, &b"3"[..], ObjectMeta::default()).unwrap();

        let names: Vec<_> = backend
            .list_objects("acct", "photos")
            .unwrap()
            .into_iter()
            .map(|v| v.path.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(backend.list_containers("acct").unwrap(), vec!["docs", "photos"]);
    }

    // ---- Quota ----

    #[test]
    fn overwrite_with_free_history_tracks_live_size() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "f", b"0123456789").unwrap();
        put(&backend, "f", b"0123").unwrap();
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 4, objects: 1 });
        backend.delete_object(&path("f")).unwrap();
        assert_eq!(backend.usage(&account()).unwrap(), Usage::default());
    }

    #[test]
    fn charged_history_until_purged() {
        let config = BackendConfig {
            free_versioning: false,
            ..config()
        };
        let backend = Backend::in_memory(config).unwrap();
        put(&backend, "f", b"0123456789").unwrap();
        put(&backend, "f", b"0123").unwrap();
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 14, objects: 1 });

        let report = backend
            .purge_history(&path("f"), PurgeScope::AllButCurrent)
            .unwrap();
        assert_eq!(report.serials, vec![1]);
        assert_eq!(report.bytes, 10);
        assert_eq!(report.delta, UsageDelta::new(-10, 0));
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 4, objects: 1 });
    }

    #[test]
    fn quota_exceeded_leaves_no_trace() {
        let config = BackendConfig {
            account_quota: 8,
            ..config()
        };
        let backend = Backend::in_memory(config).unwrap();
        put(&backend, "small", b"1234").unwrap();
        let err = put(&backend, "big", b"abcdefgh").unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded(_)));
        assert_eq!(refcount(&backend, b"abcd"), 0);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 4, objects: 1 });
        assert!(backend.index().head(&path("big")).unwrap().is_none());
        assert_eq!(backend.reclaim_blocks().unwrap().reclaimed, 2);
    }

    #[test]
    fn racing_writers_for_last_headroom() {
        let config = BackendConfig {
            account_quota: 100,
            block_size: 64,
            ..BackendConfig::default()
        };
        let backend = Backend::in_memory(config).unwrap();
        let results: Vec<BackendResult<Version>> = thread::scope(|s| {
            let handles: Vec<_> = ["left", "right"]
                .into_iter()
                .map(|name| {
                    let backend = &backend;
                    s.spawn(move || {
                        let data = vec![name.as_bytes()[0]; 60];
                        backend.put_object(&path(name), data.as_slice(), ObjectMeta::default())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(BackendError::QuotaExceeded(_)))));
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 60, objects: 1 });
    }

    #[test]
    fn concurrent_identical_puts_store_one_copy() {
        let store = Arc::new(
            RefCountedBlockStore::new(MemoryBackend::new(), IntegrityPolicy::Verify).unwrap(),
        );
        let backend = Backend::from_parts(
            config(),
            Arc::clone(&store) as Arc<dyn BlockStore>,
            Arc::new(InMemoryVersionIndex::new()),
            Arc::new(InMemoryQuotaLedger::default()),
        )
        .unwrap();

        thread::scope(|s| {
            for name in ["one", "two"] {
                let backend = &backend;
                s.spawn(move || put(backend, name, b"same").unwrap());
            }
        });
        assert_eq!(refcount(&backend, b"same"), 2);
        assert_eq!(store.backend().len(), 1);
    }

    #[test]
    fn set_limits_overrides_defaults() {
        let backend = Backend::in_memory(config()).unwrap();
        let scope = QuotaScope::Container("acct".into(), "photos".into());
        assert_eq!(backend.limits(&scope).unwrap(), QuotaLimits::unlimited());
        backend
            .set_limits(&scope, QuotaLimits::from_config(0, 1))
            .unwrap();
        put(&backend, "first", b"1").unwrap();
        assert!(matches!(
            put(&backend, "second", b"2"),
            Err(BackendError::QuotaExceeded(_))
        ));
        put(&backend, "first", b"3").unwrap();
    }

    // ---- Failures and retries ----

    #[test]
    fn index_fault_restores_quota_and_refcounts() {
        let (backend, index) = scripted(config());
        put(&backend, "keep", b"abcd").unwrap();
        let before = backend.usage(&account()).unwrap();

        index.fail_stage(IndexError::Storage("disk gone".into()));
        let err = put(&backend, "lost", b"abcdefgh").unwrap_err();
        assert!(matches!(err, BackendError::StorageIo(_)));

        assert_eq!(backend.usage(&account()).unwrap(), before);
        assert_eq!(refcount(&backend, b"abcd"), 1);
        assert_eq!(refcount(&backend, b"efgh"), 0);
        assert!(backend.index().head(&path("lost")).unwrap().is_none());
    }

    #[test]
    fn publish_fault_discards_staged_version() {
        let (backend, index) = scripted(config());
        put(&backend, "obj", b"v1").unwrap();
        index.fail_publish(IndexError::Storage("publish lost".into()));
        assert!(put(&backend, "obj", b"v2v2").is_err());

        let head = backend.index().head(&path("obj")).unwrap().unwrap();
        assert_eq!(head.serial, 1);
        assert_eq!(refcount(&backend, b"v2v2"), 0);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 2, objects: 1 });
        assert_eq!(put(&backend, "obj", b"v3").unwrap().serial, 2);
    }

    #[test]
    fn conflicts_are_retried() {
        let (backend, index) = scripted(config());
        index.fail_stage(conflict());
        index.fail_stage(conflict());
        let v = put(&backend, "contended", b"data").unwrap();
        assert_eq!(v.serial, 1);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 4, objects: 1 });
        assert_eq!(refcount(&backend, b"data"), 1);
    }

    #[test]
    fn conflicts_surface_after_retry_budget() {
        let (backend, index) = scripted(config());
        for _ in 0..4 {
            index.fail_stage(conflict());
        }
        let err = put(&backend, "contended", b"data").unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, BackendError::Conflict { attempts: 4, .. }));
        assert_eq!(backend.usage(&account()).unwrap(), Usage::default());
        assert_eq!(refcount(&backend, b"data"), 0);
    }

    #[test]
    fn corrupted_block_is_an_integrity_error() {
        let store = Arc::new(
            RefCountedBlockStore::new(MemoryBackend::new(), IntegrityPolicy::Verify).unwrap(),
        );
        let backend = Backend::from_parts(
            config(),
            Arc::clone(&store) as Arc<dyn BlockStore>,
            Arc::new(InMemoryVersionIndex::new()),
            Arc::new(InMemoryQuotaLedger::default()),
        )
        .unwrap();
        put(&backend, "obj", b"good").unwrap();
        store
            .backend()
            .corrupt(&BlockHasher::BLOCK.hash(b"good"), Bytes::from_static(b"evil"))
            .unwrap();
        assert!(matches!(
            backend.get_object(&path("obj"), VersionSelector::Current),
            Err(BackendError::Integrity(_))
        ));
    }

    // ---- Versioning policies ----

    #[test]
    fn versioning_none_keeps_only_current() {
        let config = BackendConfig {
            versioning: VersioningPolicy::None,
            ..config()
        };
        let backend = Backend::in_memory(config).unwrap();
        put(&backend, "f", b"aaaa").unwrap();
        put(&backend, "f", b"bbbb").unwrap();
        let v3 = put(&backend, "f", b"cccc").unwrap();

        let versions = backend.list_versions(&path("f")).unwrap();
        assert_eq!(versions, vec![v3]);
        assert_eq!(refcount(&backend, b"aaaa"), 0);
        assert_eq!(refcount(&backend, b"cccc"), 1);
        assert_eq!(backend.usage(&account()).unwrap(), Usage { bytes: 4, objects: 1 });
        assert_eq!(backend.reclaim_blocks().unwrap().reclaimed, 2);
    }

    #[test]
    fn auto_versioning_caps_history() {
        let config = BackendConfig {
            max_versions: Some(2),
            ..config()
        };
        let backend = Backend::in_memory(config).unwrap();
        for data in [b"v001", b"v002", b"v003"] {
            put(&backend, "f", data).unwrap();
        }
        let serials: Vec<_> = backend
            .list_versions(&path("f"))
            .unwrap()
            .into_iter()
            .map(|v| v.serial)
            .collect();
        assert_eq!(serials, vec![2, 3]);
        assert_eq!(refcount(&backend, b"v001"), 0);
    }

    #[test]
    fn manual_versioning_purges_only_on_request() {
        let config = BackendConfig {
            versioning: VersioningPolicy::Manual,
            max_versions: Some(1),
            ..config()
        };
        let backend = Backend::in_memory(config).unwrap();
        put(&backend, "f", b"old!").unwrap();
        put(&backend, "f", b"new!").unwrap();
        assert_eq!(backend.list_versions(&path("f")).unwrap().len(), 2);

        let report = backend.purge_history(&path("f"), PurgeScope::KeepLatest(1)).unwrap();
        assert_eq!(report.serials, vec![1]);
        assert_eq!(refcount(&backend, b"old!"), 0);
    }

    #[test]
    fn purge_all_removes_live_object_usage() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "f", b"12345678").unwrap();
        let report = backend.purge_history(&path("f"), PurgeScope::All).unwrap();
        assert_eq!(report.delta, UsageDelta::new(-8, -1));
        assert_eq!(backend.usage(&account()).unwrap(), Usage::default());
        assert!(backend.purge_history(&path("f"), PurgeScope::All).unwrap().is_empty());
    }

    // ---- Public URLs and events ----

    #[test]
    fn purging_current_version_withdraws_public_token() {
        let backend = Backend::in_memory(config()).unwrap();
        put(&backend, "pic", b"jpeg").unwrap();
        let token = backend.set_public(&path("pic")).unwrap();

        backend.purge_history(&path("pic"), PurgeScope::AllButCurrent).unwrap();
        assert_eq!(backend.resolve_public(&token).unwrap(), path("pic"));

        backend.purge_history(&path("pic"), PurgeScope::All).unwrap();
        assert!(matches!(
            backend.resolve_public(&token),
            Err(BackendError::NotFound(_))
        ));
        assert!(backend.public_token(&path("pic")).unwrap().is_none());
    }


    #[test]
    fn public_tokens_follow_object_lifecycle() {
        let backend = Backend::in_memory(config()).unwrap();
        assert!(matches!(
            backend.set_public(&path("pic")),
            Err(BackendError::NotFound(_))
        ));
        put(&backend, "pic", b"jpeg").unwrap();

        let token = backend.set_public(&path("pic")).unwrap();
        // 128 random bits in base 62 need at most 22 symbols.
        assert!(!token.is_empty() && token.len() <= 22);
        assert!(token.chars().all(|c| pith_crypto::DEFAULT_ALPHABET.contains(c)));
        assert_eq!(backend.set_public(&path("pic")).unwrap(), token);
        assert_eq!(backend.resolve_public(&token).unwrap(), path("pic"));

        backend.delete_object(&path("pic")).unwrap();
        assert!(matches!(
            backend.resolve_public(&token),
            Err(BackendError::NotFound(_))
        ));
        assert!(backend.public_token(&path("pic")).unwrap().is_none());
        assert!(!backend.clear_public(&path("pic")).unwrap());
    }

    #[test]
    fn usage_events_after_commits() {
        let sink = Arc::new(MemorySink::new());
        let backend = Backend::in_memory(config())
            .unwrap()
            .with_sink(Arc::clone(&sink) as Arc<dyn UsageSink>);
        put(&backend, "e", b"12345").unwrap();
        backend.delete_object(&path("e")).unwrap();
        put(&backend, "empty", b"").unwrap();

        let events = sink.events();
        assert_eq!(events[0].kind, UsageEventKind::Write);
        assert_eq!(events[0].delta, UsageDelta::new(5, 1));
        assert_eq!(events[1].kind, UsageEventKind::Delete);
        assert_eq!(events[1].serial, Some(2));
        assert_eq!(events[1].delta, UsageDelta::new(-5, -1));
        assert_eq!(events.len(), 3);
    }

    // ---- Journal and recovery ----

    #[test]
    fn reopen_replays_journal() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig {
            block_size: 4,
            fsync: FsyncPolicy::Never,
            ..BackendConfig::persistent(dir.path())
        };
        let limits_scope = QuotaScope::Container("acct".into(), "photos".into());

        let (usage, token) = {
            let backend = Backend::open(config.clone()).unwrap();
            put(&backend, "a", b"first version").unwrap();
            put(&backend, "a", b"second").unwrap();
            put(&backend, "b", b"doomed").unwrap();
            backend.delete_object(&path("b")).unwrap();
            backend
                .set_limits(&limits_scope, QuotaLimits::from_config(1 << 20, 0))
                .unwrap();
            let token = backend.set_public(&path("a")).unwrap();
            (backend.usage(&account()).unwrap(), token)
        };

        let backend = Backend::open(config).unwrap();
        assert_eq!(backend.recovery().versions, 4);
        assert!(backend.recovery().missing_blocks.is_empty());
        assert_eq!(&content(&backend, "a", VersionSelector::Current)[..], b"second");
        assert_eq!(
            &content(&backend, "a", VersionSelector::Serial(1))[..],
            b"first version"
        );
        assert!(backend.get_object(&path("b"), VersionSelector::Current).is_err());
        assert_eq!(backend.usage(&account()).unwrap(), usage);
        assert_eq!(
            backend.limits(&limits_scope).unwrap().max_bytes,
            Some(1 << 20)
        );
        assert_eq!(backend.resolve_public(&token).unwrap(), path("a"));
        assert_eq!(refcount(&backend, b"firs"), 1);
        assert_eq!(refcount(&backend, b"seco"), 1);
        assert_eq!(refcount(&backend, b"doom"), 1);

        let next = put(&backend, "a", b"third").unwrap();
        assert_eq!(next.serial, 3);
    }

    #[test]
    fn reopen_replays_purges_and_reclaims_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig {
            block_size: 4,
            fsync: FsyncPolicy::Never,
            ..BackendConfig::persistent(dir.path())
        };
        {
            let backend = Backend::open(config.clone()).unwrap();
            put(&backend, "a", b"old!").unwrap();
            put(&backend, "a", b"new!").unwrap();
            backend
                .purge_history(&path("a"), PurgeScope::AllButCurrent)
                .unwrap();
        }

        let orphan = BlockHasher::BLOCK.hash(b"orphan");
        let blocks_dir = dir.path().join("blocks");
        FsBackend::open(&blocks_dir, FsyncPolicy::Never)
            .unwrap()
            .write(&orphan, &Bytes::from_static(b"orphan"))
            .unwrap();

        let backend = Backend::open(config).unwrap();
        assert_eq!(backend.recovery().purged, 1);
        assert_eq!(backend.list_versions(&path("a")).unwrap().len(), 1);
        assert_eq!(refcount(&backend, b"old!"), 0);
        assert_eq!(refcount(&backend, b"new!"), 1);

        let report = backend.reclaim_blocks().unwrap();
        assert_eq!(report.reclaimed, 2);
        assert!(!backend.blocks().contains(&orphan).unwrap());
        assert_eq!(&content(&backend, "a", VersionSelector::Current)[..], b"new!");
    }

    fn persistent_config(dir: &std::path::Path) -> BackendConfig {
        BackendConfig {
            block_size: 4,
            fsync: FsyncPolicy::Never,
            ..BackendConfig::persistent(dir)
        }
    }

    fn journal(backend: &Backend) -> &Journal {
        backend.journal.as_ref().unwrap()
    }

    #[test]
    fn failed_commit_append_is_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let config = persistent_config(dir.path());

        let (usage, versions) = {
            let backend = Backend::open(config.clone()).unwrap();
            put(&backend, "a", b"kept").unwrap();

            journal(&backend).fail_next_sync();
            assert!(matches!(
                put(&backend, "a", b"lost"),
                Err(BackendError::StorageIo(_))
            ));
            assert_eq!(refcount(&backend, b"lost"), 0);
            assert_eq!(backend.list_versions(&path("a")).unwrap().len(), 1);

            let next = put(&backend, "a", b"next").unwrap();
            assert_eq!(next.serial, 2);
            (
                backend.usage(&account()).unwrap(),
                backend.list_versions(&path("a")).unwrap(),
            )
        };

        let backend = Backend::open(config).unwrap();
        assert_eq!(backend.recovery().versions, 2);
        assert_eq!(backend.list_versions(&path("a")).unwrap(), versions);
        assert_eq!(backend.usage(&account()).unwrap(), usage);
        assert_eq!(refcount(&backend, b"kept"), 1);
        assert_eq!(refcount(&backend, b"next"), 1);
        assert_eq!(refcount(&backend, b"lost"), 0);
        assert_eq!(&content(&backend, "a", VersionSelector::Current)[..], b"next");
    }

    #[test]
    fn failed_purge_append_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let config = persistent_config(dir.path());
        let backend = Backend::open(config.clone()).unwrap();
        put(&backend, "a", b"old!").unwrap();
        put(&backend, "a", b"new!").unwrap();
        let usage = backend.usage(&account()).unwrap();

        journal(&backend).fail_next_sync();
        assert!(matches!(
            backend.purge_history(&path("a"), PurgeScope::AllButCurrent),
            Err(BackendError::StorageIo(_))
        ));
        assert_eq!(backend.list_versions(&path("a")).unwrap().len(), 2);
        assert_eq!(&content(&backend, "a", VersionSelector::Serial(1))[..], b"old!");
        assert_eq!(refcount(&backend, b"old!"), 1);
        assert_eq!(backend.usage(&account()).unwrap(), usage);

        let report = backend
            .purge_history(&path("a"), PurgeScope::AllButCurrent)
            .unwrap();
        assert_eq!(report.serials, vec![1]);
        drop(backend);

        let backend = Backend::open(config).unwrap();
        assert_eq!(backend.list_versions(&path("a")).unwrap().len(), 1);
        assert_eq!(refcount(&backend, b"old!"), 0);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let config = BackendConfig {
            block_size: 0,
            ..BackendConfig::default()
        };
        assert!(matches!(Backend::open(config), Err(BackendError::Config(_))));
    }
}
