use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use pith_types::{ObjectPath, Timestamp};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::traits::VersionIndex;
use crate::version::{NewVersion, PurgeScope, Version, VersionSelector};

/// In-memory version index for tests, local tools, and embedding.
///
/// One `RwLock` guards every chain; serial allocation and conflict checks
/// happen under the write lock, so concurrent writers of the same path
/// always observe each other.
pub struct InMemoryVersionIndex {
    inner: RwLock<IndexState>,
}

#[derive(Default)]
struct IndexState {
    objects: BTreeMap<ObjectPath, Chain>,
}

struct Chain {
    entries: BTreeMap<u64, Entry>,
    /// Highest serial ever allocated; survives purges so serials are never
    /// reused.
    last_serial: u64,
    last_modified: Timestamp,
}

struct Entry {
    version: Version,
    pending: bool,
}

impl Chain {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            last_serial: 0,
            last_modified: Timestamp::zero(),
        }
    }

    fn head(&self) -> Option<&Version> {
        self.entries.values().next_back().map(|e| &e.version)
    }

    fn published(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.entries
            .values()
            .filter(|e| !e.pending)
            .map(|e| &e.version)
    }

    fn latest_published(&self) -> Option<&Version> {
        self.published().next_back()
    }

    fn allocate(&mut self, new: NewVersion, pending: bool) -> Version {
        let modified = Timestamp::next_after(&self.last_modified);
        let created = match self.head() {
            Some(prev) if !prev.deleted => prev.created,
            _ => modified,
        };
        let serial = self.last_serial + 1;
        let version = Version {
            path: new.path,
            serial,
            hashmap: new.hashmap,
            size: new.size,
            meta: new.meta,
            created,
            modified,
            deleted: new.deleted,
        };
        self.last_serial = serial;
        self.last_modified = modified;
        self.entries.insert(
            serial,
            Entry {
                version: version.clone(),
                pending,
            },
        );
        version
    }
}

impl InMemoryVersionIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexState::default()),
        }
    }

    /// Number of paths with at least one published version.
    pub fn object_count(&self) -> IndexResult<usize> {
        let state = self.read()?;
        Ok(state
            .objects
            .values()
            .filter(|c| c.latest_published().is_some())
            .count())
    }

    fn read(&self) -> IndexResult<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.inner.read().map_err(|_| IndexError::LockPoisoned)
    }

    fn write(&self) -> IndexResult<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.inner.write().map_err(|_| IndexError::LockPoisoned)
    }
}

impl Default for InMemoryVersionIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &ObjectPath, selector: VersionSelector) -> IndexError {
    IndexError::NotFound {
        path: path.clone(),
        selector,
    }
}

impl VersionIndex for InMemoryVersionIndex {
    fn create_version(&self, new: NewVersion) -> IndexResult<Version> {
        new.path.validate()?;
        let mut state = self.write()?;
        let chain = state
            .objects
            .entry(new.path.clone())
            .or_insert_with(Chain::new);
        let version = chain.allocate(new, false);
        debug!(path = %version.path, serial = version.serial, deleted = version.deleted, "version created");
        Ok(version)
    }

    fn stage_version(&self, new: NewVersion, expected_head: Option<u64>) -> IndexResult<Version> {
        new.path.validate()?;
        let mut state = self.write()?;
        let actual = state
            .objects
            .get(&new.path)
            .and_then(Chain::head)
            .map(|v| v.serial);
        if actual != expected_head {
            return Err(IndexError::Conflict {
                path: new.path,
                expected: expected_head,
                actual,
            });
        }
        let chain = state
            .objects
            .entry(new.path.clone())
            .or_insert_with(Chain::new);
        let version = chain.allocate(new, true);
        debug!(path = %version.path, serial = version.serial, "version staged");
        Ok(version)
    }

    fn publish(&self, path: &ObjectPath, serial: u64) -> IndexResult<Version> {
        let mut state = self.write()?;
        let entry = state
            .objects
            .get_mut(path)
            .and_then(|c| c.entries.get_mut(&serial))
            .ok_or_else(|| not_found(path, VersionSelector::Serial(serial)))?;
        if !entry.pending {
            return Err(IndexError::NotPending {
                path: path.clone(),
                serial,
            });
        }
        entry.pending = false;
        debug!(path = %path, serial, "version published");
        Ok(entry.version.clone())
    }

    fn discard(&self, path: &ObjectPath, serial: u64) -> IndexResult<()> {
        let mut state = self.write()?;
        let chain = state
            .objects
            .get_mut(path)
            .ok_or_else(|| not_found(path, VersionSelector::Serial(serial)))?;
        match chain.entries.get(&serial) {
            None => return Err(not_found(path, VersionSelector::Serial(serial))),
            Some(entry) if !entry.pending => {
                return Err(IndexError::NotPending {
                    path: path.clone(),
                    serial,
                })
            }
            Some(_) => {}
        }
        chain.entries.remove(&serial);
        if chain.last_serial == serial {
            chain.last_serial -= 1;
        }
        if chain.entries.is_empty() && chain.last_serial == 0 {
            state.objects.remove(path);
        }
        debug!(path = %path, serial, "staged version discarded");
        Ok(())
    }

    fn get_version(&self, path: &ObjectPath, selector: VersionSelector) -> IndexResult<Version> {
        let state = self.read()?;
        let chain = state
            .objects
            .get(path)
            .ok_or_else(|| not_found(path, selector))?;
        let found = match selector {
            VersionSelector::Current => chain.latest_published().filter(|v| !v.deleted),
            VersionSelector::Serial(n) => chain
                .entries
                .get(&n)
                .filter(|e| !e.pending)
                .map(|e| &e.version),
            VersionSelector::AsOf(ms) => chain
                .published()
                .rev()
                .find(|v| v.modified.physical_ms <= ms)
                .filter(|v| !v.deleted),
        };
        found.cloned().ok_or_else(|| not_found(path, selector))
    }

    fn head(&self, path: &ObjectPath) -> IndexResult<Option<Version>> {
        let state = self.read()?;
        Ok(state.objects.get(path).and_then(Chain::head).cloned())
    }

    fn list_versions(&self, path: &ObjectPath) -> IndexResult<Vec<Version>> {
        let state = self.read()?;
        Ok(state
            .objects
            .get(path)
            .map(|c| c.published().cloned().collect())
            .unwrap_or_default())
    }

    fn list_objects(&self, account: &str, container: &str) -> IndexResult<Vec<Version>> {
        let state = self.read()?;
        Ok(state
            .objects
            .iter()
            .filter(|(p, _)| p.account == account && p.container == container)
            .filter_map(|(_, c)| c.latest_published())
            .filter(|v| !v.deleted)
            .cloned()
            .collect())
    }

    fn list_containers(&self, account: &str) -> IndexResult<Vec<String>> {
        let state = self.read()?;
        let containers: BTreeSet<String> = state
            .objects
            .iter()
            .filter(|(p, c)| p.account == account && c.latest_published().is_some())
            .map(|(p, _)| p.container.clone())
            .collect();
        Ok(containers.into_iter().collect())
    }

    fn purge(&self, path: &ObjectPath, scope: PurgeScope) -> IndexResult<Vec<Version>> {
        let mut state = self.write()?;
        let Some(chain) = state.objects.get_mut(path) else {
            return Ok(Vec::new());
        };

        let published: Vec<(u64, u64)> = chain
            .published()
            .map(|v| (v.serial, v.modified.physical_ms))
            .collect();
        let latest = published.last().map(|(serial, _)| *serial);
        let doomed: Vec<u64> = match &scope {
            PurgeScope::AllButCurrent => published
                .iter()
                .map(|(s, _)| *s)
                .filter(|s| Some(*s) != latest)
                .collect(),
            PurgeScope::Before(cutoff) => published
                .iter()
                .filter(|(s, ms)| Some(*s) != latest && ms < cutoff)
                .map(|(s, _)| *s)
                .collect(),
            PurgeScope::KeepLatest(n) => {
                let cut = published.len().saturating_sub((*n).max(1));
                published[..cut].iter().map(|(s, _)| *s).collect()
            }
            PurgeScope::Serials(serials) => published
                .iter()
                .map(|(s, _)| *s)
                .filter(|s| serials.contains(s))
                .collect(),
            PurgeScope::All => published.iter().map(|(s, _)| *s).collect(),
        };

        let removed: Vec<Version> = doomed
            .iter()
            .filter_map(|s| chain.entries.remove(s))
            .map(|e| e.version)
            .collect();
        if !removed.is_empty() {
            debug!(path = %path, removed = removed.len(), scope = ?scope, "versions purged");
        }
        Ok(removed)
    }

    fn restore(&self, version: Version) -> IndexResult<()> {
        version.path.validate()?;
        let mut state = self.write()?;
        let chain = state
            .objects
            .entry(version.path.clone())
            .or_insert_with(Chain::new);
        chain.last_serial = chain.last_serial.max(version.serial);
        chain.last_modified = chain.last_modified.max(version.modified);
        chain.entries.insert(
            version.serial,
            Entry {
                version,
                pending: false,
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryVersionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.object_count().unwrap_or(0);
        f.debug_struct("InMemoryVersionIndex")
            .field("object_count", &count)
            .finish()
    }
}
