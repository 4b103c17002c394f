use std::collections::{BTreeMap, HashSet};

use pith_index::{PurgeScope, VersionIndex};
use pith_quota::QuotaLedger;
use pith_store::{BlockStore, StoreError};
use pith_types::BlockHash;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BackendResult;
use crate::journal::{JournalEntry, JournalRecord};
use crate::public::PublicRegistry;

/// Outcome of rebuilding state from the journal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries read from the journal.
    pub entries: usize,
    /// Entries ignored because a later record aborted their transaction.
    pub skipped_aborted: usize,
    /// Versions restored into the index.
    pub versions: usize,
    /// Versions removed again by journaled purges.
    pub purged: usize,
    /// Referenced blocks whose bytes are gone.
    pub missing_blocks: Vec<BlockHash>,
}

/// Apply journal entries, oldest first, to freshly constructed stores.
///
/// Block reference counts are rebuilt from the surviving versions: every
/// hashmap occurrence of a restored version that was not purged later holds
/// one reference.
pub(crate) fn replay(
    entries: &[JournalEntry],
    blocks: &dyn BlockStore,
    index: &dyn VersionIndex,
    ledger: &dyn QuotaLedger,
    public: &PublicRegistry,
) -> BackendResult<ReplayReport> {
    let aborted: HashSet<Uuid> = entries
        .iter()
        .flat_map(|e| e.records.iter())
        .filter_map(|r| match r {
            JournalRecord::Aborted { txn } => Some(*txn),
            _ => None,
        })
        .collect();

    let mut report = ReplayReport {
        entries: entries.len(),
        ..ReplayReport::default()
    };
    let mut refs: BTreeMap<BlockHash, i64> = BTreeMap::new();

    for entry in entries {
        if aborted.contains(&entry.txn) && !is_abort_marker(entry) {
            debug!(txn = %entry.txn, "skipping aborted journal entry");
            report.skipped_aborted += 1;
            continue;
        }
        for record in &entry.records {
            match record {
                JournalRecord::VersionAdded(version) => {
                    for (hash, n) in version.hashmap.occurrences() {
                        *refs.entry(hash).or_default() += n as i64;
                    }
                    index.restore(version.clone())?;
                    report.versions += 1;
                }
                JournalRecord::VersionsPurged { path, serials } => {
                    let removed = index.purge(path, PurgeScope::Serials(serials.clone()))?;
                    for version in &removed {
                        for (hash, n) in version.hashmap.occurrences() {
                            *refs.entry(hash).or_default() -= n as i64;
                        }
                    }
                    report.purged += removed.len();
                }
                JournalRecord::UsageApplied {
                    account,
                    container,
                    delta,
                } => ledger.apply(account, container, *delta)?,
                JournalRecord::LimitsSet { scope, limits } => ledger.set_limits(scope, *limits)?,
                JournalRecord::PublicSet { path, token } => {
                    public.insert(path.clone(), token.clone())?
                }
                JournalRecord::PublicCleared { path } => {
                    public.clear(path)?;
                }
                JournalRecord::Aborted { .. } => {}
            }
        }
    }

    for (hash, count) in refs {
        match count {
            0 => {}
            n if n < 0 => {
                warn!(hash = %hash.short_hex(), count = n, "journal purges more references than it adds");
            }
            n => match blocks.incref(&hash, n as u64) {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    error!(hash = %hash.short_hex(), "journaled block is missing from the block store");
                    report.missing_blocks.push(hash);
                }
                Err(e) => return Err(e.into()),
            },
        }
    }

    info!(
        entries = report.entries,
        versions = report.versions,
        purged = report.purged,
        skipped = report.skipped_aborted,
        missing = report.missing_blocks.len(),
        "journal replayed"
    );
    Ok(report)
}

fn is_abort_marker(entry: &JournalEntry) -> bool {
    entry
        .records
        .iter()
        .all(|r| matches!(r, JournalRecord::Aborted { .. }))
}
