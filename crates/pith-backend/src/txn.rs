use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use pith_quota::{QuotaLedger, Reservation, UsageDelta};
use pith_store::BlockStore;
use pith_types::BlockHash;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{BackendError, BackendResult};

/// Progress of one commit.
///
/// ```text
/// Started -> BlocksWritten -> QuotaReserved -> VersionCommitted
///    \______________\_______________\________> Aborted
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitState {
    Started,
    BlocksWritten,
    QuotaReserved,
    VersionCommitted,
    Aborted,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::VersionCommitted | Self::Aborted)
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::BlocksWritten => "blocks_written",
            Self::QuotaReserved => "quota_reserved",
            Self::VersionCommitted => "version_committed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One all-or-nothing commit.
///
/// Records every block reference it takes and the quota it reserves. If it
/// is aborted, or dropped before [`commit`](Self::commit), it decrements
/// those references and releases the reservation, leaving the store and the
/// ledger as they were. Blocks whose count drops to zero stay on disk until
/// the next reclaim.
pub struct CommitTxn<'a> {
    id: Uuid,
    state: CommitState,
    blocks: &'a dyn BlockStore,
    ledger: &'a dyn QuotaLedger,
    block_refs: Vec<BlockHash>,
    reservation: Option<Reservation>,
}

impl<'a> CommitTxn<'a> {
    pub fn begin(blocks: &'a dyn BlockStore, ledger: &'a dyn QuotaLedger) -> Self {
        let id = Uuid::now_v7();
        debug!(txn = %id, "commit started");
        Self {
            id,
            state: CommitState::Started,
            blocks,
            ledger,
            block_refs: Vec::new(),
            reservation: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    /// Hashes referenced so far, one entry per reference.
    pub fn block_refs(&self) -> &[BlockHash] {
        &self.block_refs
    }

    /// Store a block (or add a reference if it exists) on behalf of this
    /// commit.
    pub fn put_block(&mut self, hash: &BlockHash, data: Bytes) -> BackendResult<()> {
        self.require_state(CommitState::Started, "put_block")?;
        self.blocks.put(hash, data)?;
        self.block_refs.push(*hash);
        Ok(())
    }

    /// Reference an already stored block.
    pub fn ref_block(&mut self, hash: &BlockHash) -> BackendResult<()> {
        self.require_state(CommitState::Started, "ref_block")?;
        self.blocks.incref(hash, 1)?;
        self.block_refs.push(*hash);
        Ok(())
    }

    pub fn blocks_written(&mut self) -> BackendResult<()> {
        self.require_state(CommitState::Started, "blocks_written")?;
        self.state = CommitState::BlocksWritten;
        Ok(())
    }

    /// Check and reserve quota for the commit.
    pub fn reserve(&mut self, account: &str, container: &str, delta: UsageDelta) -> BackendResult<()> {
        self.require_state(CommitState::BlocksWritten, "reserve")?;
        let reservation = self.ledger.check_and_reserve(account, container, delta)?;
        self.reservation = Some(reservation);
        self.state = CommitState::QuotaReserved;
        Ok(())
    }

    /// Give the reservation back and return to `BlocksWritten`, keeping the
    /// block references. Used before re-reserving after a lost race.
    pub fn release_reservation(&mut self) -> BackendResult<()> {
        self.require_state(CommitState::QuotaReserved, "release_reservation")?;
        if let Some(reservation) = self.reservation.take() {
            self.ledger.release(reservation)?;
        }
        self.state = CommitState::BlocksWritten;
        Ok(())
    }

    /// Mark the version as durable and visible. Compensations are disarmed.
    pub fn commit(mut self) -> BackendResult<Uuid> {
        self.require_state(CommitState::QuotaReserved, "commit")?;
        self.reservation = None;
        self.block_refs.clear();
        self.state = CommitState::VersionCommitted;
        debug!(txn = %self.id, "commit complete");
        Ok(self.id)
    }

    /// Undo everything this commit did.
    pub fn abort(mut self) {
        self.compensate();
    }

    fn require_state(&self, state: CommitState, op: &str) -> BackendResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(BackendError::Internal(format!(
                "{op} called in state {} (txn {})",
                self.state, self.id
            )))
        }
    }

    fn compensate(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let from = self.state;
        if let Some(reservation) = self.reservation.take() {
            if let Err(e) = self.ledger.release(reservation) {
                error!(txn = %self.id, error = %e, "failed to release quota reservation");
            }
        }
        let mut counts: BTreeMap<BlockHash, u64> = BTreeMap::new();
        for hash in self.block_refs.drain(..) {
            *counts.entry(hash).or_default() += 1;
        }
        for (hash, n) in &counts {
            if let Err(e) = self.blocks.decref(hash, *n) {
                error!(txn = %self.id, hash = %hash.short_hex(), error = %e, "failed to drop block reference");
            }
        }
        self.state = CommitState::Aborted;
        warn!(txn = %self.id, from = %from, blocks = counts.len(), "commit aborted");
    }
}

impl Drop for CommitTxn<'_> {
    fn drop(&mut self) {
        self.compensate();
    }
}

impl fmt::Debug for CommitTxn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitTxn")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("block_refs", &self.block_refs.len())
            .field("reserved", &self.reservation.is_some())
            .finish()
    }
}
