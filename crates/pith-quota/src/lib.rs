//! Quota and usage accounting for the Pith object store.
//!
//! Usage is tracked per container and per account in two dimensions, bytes
//! and object count. [`QuotaLedger::check_and_reserve`] is the only way a
//! write grows usage: it checks every growing dimension against the
//! container and account limits and applies the delta in one atomic step
//! under the account's lock.
//!
//! How much a write, delete, or purge costs is decided by
//! [`AccountingPolicy`], which knows whether version history is charged.

pub mod error;
pub mod memory;
pub mod policy;
pub mod traits;
pub mod types;

pub use error::{QuotaError, QuotaResult};
pub use memory::InMemoryQuotaLedger;
pub use policy::AccountingPolicy;
pub use traits::QuotaLedger;
pub use types::{Dimension, LedgerDefaults, QuotaLimits, QuotaScope, Reservation, Usage, UsageDelta};
