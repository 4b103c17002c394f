//! Commit coordinator and object API for the Pith object store.
//!
//! [`Backend`] is the narrow surface collaborators call: put, read, copy,
//! delete, list, purge, quota, and public-URL operations on objects. Every
//! mutation is all-or-nothing. A [`CommitTxn`] walks
//! `Started -> BlocksWritten -> QuotaReserved -> VersionCommitted`; if it is
//! dropped before the last step it decrements every block reference it took
//! and releases its quota reservation.
//!
//! A version becomes visible only after its [`JournalEntry`] is durable.
//! [`Backend::open`] replays the journal to rebuild the index, the usage
//! counters, the block reference counts, and the public URL registry.
//!
//! - `Backend` object API and commit protocol
//! - `CommitTxn` RAII transaction with compensations
//! - `Journal` length-prefixed, CRC-checked commit log
//! - `UsageSink` best-effort usage events for billing

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod locks;
pub mod public;
pub mod replay;
pub mod txn;

pub use backend::{Backend, PurgeReport};
pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};
pub use events::{ChannelSink, MemorySink, NullSink, UsageEvent, UsageEventKind, UsageSink};
pub use journal::{Journal, JournalEntry, JournalError, JournalRecord, SyncMode};
pub use public::PublicRegistry;
pub use replay::ReplayReport;
pub use txn::{CommitState, CommitTxn};

pub use pith_index::{ObjectMeta, PurgeScope, Version, VersionSelector};
pub use pith_quota::{QuotaLimits, QuotaScope, Usage, UsageDelta};
pub use pith_store::ReclaimReport;
