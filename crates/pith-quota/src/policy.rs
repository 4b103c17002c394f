use pith_types::VersioningPolicy;
use serde::{Deserialize, Serialize};

use crate::types::UsageDelta;

/// How writes, deletes, and purges translate into usage deltas.
///
/// When history is free, usage tracks live objects only: overwriting a
/// 10-byte object with a 4-byte one costs `-6` bytes. When history is
/// charged, every retained version counts until it is purged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPolicy {
    pub versioning: VersioningPolicy,
    pub free_versioning: bool,
}

impl Default for AccountingPolicy {
    fn default() -> Self {
        Self::new(VersioningPolicy::Auto, true)
    }
}

impl AccountingPolicy {
    pub fn new(versioning: VersioningPolicy, free_versioning: bool) -> Self {
        Self {
            versioning,
            free_versioning,
        }
    }

    /// Whether retained historical versions count against quota.
    pub fn charges_history(&self) -> bool {
        self.versioning != VersioningPolicy::None && !self.free_versioning
    }

    /// Cost of writing `new_size` bytes over a live object of
    /// `previous_live` bytes (or over nothing).
    pub fn write_delta(&self, previous_live: Option<u64>, new_size: u64) -> UsageDelta {
        let objects = if previous_live.is_some() { 0 } else { 1 };
        let bytes = if self.charges_history() {
            as_signed(new_size)
        } else {
            as_signed(new_size) - as_signed(previous_live.unwrap_or(0))
        };
        UsageDelta::new(bytes, objects)
    }

    /// Cost of deleting a live object of `live_size` bytes.
    pub fn delete_delta(&self, live_size: u64) -> UsageDelta {
        let bytes = if self.charges_history() {
            0
        } else {
            -as_signed(live_size)
        };
        UsageDelta::new(bytes, -1)
    }

    /// Cost of purging historical versions totalling `purged_bytes`.
    pub fn purge_delta(&self, purged_bytes: u64) -> UsageDelta {
        if self.charges_history() {
            UsageDelta::new(-as_signed(purged_bytes), 0)
        } else {
            UsageDelta::zero()
        }
    }
}

fn as_signed(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
