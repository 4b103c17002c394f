use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pith_index::Version;
use pith_quota::{QuotaLimits, QuotaScope, UsageDelta};
use pith_types::{ObjectPath, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Errors from the commit journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(String),

    #[error("journal lock poisoned")]
    LockPoisoned,
}

pub type JournalResult<T> = Result<T, JournalError>;

/// One durable state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A version was published; its blocks each hold one reference per
    /// hashmap occurrence.
    VersionAdded(Version),
    /// Versions were purged; their block references were dropped.
    VersionsPurged { path: ObjectPath, serials: Vec<u64> },
    UsageApplied {
        account: String,
        container: String,
        delta: UsageDelta,
    },
    LimitsSet {
        scope: QuotaScope,
        limits: QuotaLimits,
    },
    PublicSet { path: ObjectPath, token: String },
    PublicCleared { path: ObjectPath },
    /// An earlier entry must be ignored on replay.
    Aborted { txn: Uuid },
}

/// All records of one transaction, written as a single framed entry.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalEntry)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub txn: Uuid,
    pub at: Timestamp,
    pub records: Vec<JournalRecord>,
}

impl JournalEntry {
    pub fn new(txn: Uuid, records: Vec<JournalRecord>) -> Self {
        Self {
            txn,
            at: Timestamp::now(),
            records,
        }
    }
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every entry.
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only.
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only commit journal.
///
/// Entries are serialized with bincode, framed with a length prefix and a
/// CRC32 checksum. Recovery reads front-to-back: entries failing the CRC
/// are skipped and a torn tail ends recovery.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync: SyncMode,
    #[cfg(test)]
    fail_next_sync: std::sync::atomic::AtomicBool,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, sync: SyncMode) -> JournalResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync,
            #[cfg(test)]
            fail_next_sync: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Append one entry. Returns its byte offset. The entry is durable (per
    /// the sync mode) when this returns.
    ///
    /// A failed append is cut back out of the file, so a later recovery
    /// never sees an entry whose caller was told it failed.
    pub fn append(&self, entry: &JournalEntry) -> JournalResult<u64> {
        let payload =
            bincode::serialize(entry).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| JournalError::Serialization("entry exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().map_err(|_| JournalError::LockPoisoned)?;
        let entry_offset = w.offset;

        if let Err(e) = self.write_frame(&mut w, length, crc, &payload) {
            warn!(offset = entry_offset, txn = %entry.txn, error = %e, "journal append failed; rolling back");
            if let Err(re) = self.rollback(&mut w, entry_offset) {
                error!(offset = entry_offset, error = %re, "journal rollback failed");
            }
            return Err(e.into());
        }

        w.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(offset = entry_offset, len = payload.len(), txn = %entry.txn, "journal append");
        Ok(entry_offset)
    }

    fn write_frame(
        &self,
        w: &mut JournalWriter,
        length: u32,
        crc: u32,
        payload: &[u8],
    ) -> io::Result<()> {
        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(payload)?;
        w.writer.flush()?;
        #[cfg(test)]
        {
            if self
                .fail_next_sync
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(io::Error::other("injected sync failure"));
            }
        }
        if self.sync == SyncMode::EveryWrite {
            w.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop whatever a failed append left buffered or on disk past `end`.
    fn rollback(&self, w: &mut JournalWriter, end: u64) -> io::Result<()> {
        let file = w.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut w.writer, BufWriter::new(file));
        // `into_parts` hands back the unflushed buffer instead of writing it.
        let (_, _unwritten) = stale.into_parts();
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(end)?;
        file.sync_all()?;
        w.offset = end;
        Ok(())
    }

    /// Make the next append fail after its bytes reach the file.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&self) {
        self.fail_next_sync
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Read every valid entry in append order.
    ///
    /// A torn tail is cut off, so later appends follow the last complete
    /// entry.
    pub fn recover(&self) -> JournalResult<Vec<JournalEntry>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "torn journal tail; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping journal entry");
            } else {
                match bincode::deserialize::<JournalEntry>(&payload) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(offset, error = %e, "undecodable journal entry; skipping"),
                }
            }

            offset += HEADER_SIZE as u64 + length as u64;
        }

        if offset < file_len {
            self.truncate_to(offset)?;
        }

        debug!(recovered = entries.len(), "journal recovery complete");
        Ok(entries)
    }

    fn truncate_to(&self, end: u64) -> JournalResult<()> {
        let mut w = self.writer.lock().map_err(|_| JournalError::LockPoisoned)?;
        w.writer.flush()?;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(end)?;
        file.sync_all()?;
        warn!(from = w.offset, to = end, "truncated torn journal tail");
        w.offset = end;
        Ok(())
    }

    /// Current end-of-journal offset.
    pub fn offset(&self) -> JournalResult<u64> {
        Ok(self.writer.lock().map_err(|_| JournalError::LockPoisoned)?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish()
    }
}
