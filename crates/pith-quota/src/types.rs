use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Limits on one scope. `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_bytes: Option<u64>,
    pub max_objects: Option<u64>,
}

impl QuotaLimits {
    pub const fn unlimited() -> Self {
        Self {
            max_bytes: None,
            max_objects: None,
        }
    }

    /// Limits from configuration values, where `0` means unlimited.
    pub fn from_config(max_bytes: u64, max_objects: u64) -> Self {
        Self {
            max_bytes: (max_bytes > 0).then_some(max_bytes),
            max_objects: (max_objects > 0).then_some(max_objects),
        }
    }

    pub fn limit(&self, dimension: Dimension) -> Option<u64> {
        match dimension {
            Dimension::Bytes => self.max_bytes,
            Dimension::Objects => self.max_objects,
        }
    }
}

/// Counters for one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub bytes: u64,
    pub objects: u64,
}

impl Usage {
    pub fn get(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::Bytes => self.bytes,
            Dimension::Objects => self.objects,
        }
    }

    /// Apply a signed delta. Counters never go below zero.
    pub fn apply(&mut self, delta: UsageDelta) {
        if self.bytes.checked_add_signed(delta.bytes).is_none()
            || self.objects.checked_add_signed(delta.objects).is_none()
        {
            warn!(usage = ?self, delta = ?delta, "usage counter clamped");
        }
        self.bytes = self.bytes.saturating_add_signed(delta.bytes);
        self.objects = self.objects.saturating_add_signed(delta.objects);
    }
}

/// Signed change to usage counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub bytes: i64,
    pub objects: i64,
}

impl UsageDelta {
    pub const fn new(bytes: i64, objects: i64) -> Self {
        Self { bytes, objects }
    }

    pub const fn zero() -> Self {
        Self {
            bytes: 0,
            objects: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == 0 && self.objects == 0
    }

    pub fn inverse(&self) -> Self {
        Self {
            bytes: -self.bytes,
            objects: -self.objects,
        }
    }

    pub fn get(&self, dimension: Dimension) -> i64 {
        match dimension {
            Dimension::Bytes => self.bytes,
            Dimension::Objects => self.objects,
        }
    }
}

impl Add for UsageDelta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            bytes: self.bytes + rhs.bytes,
            objects: self.objects + rhs.objects,
        }
    }
}

/// A metered dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Bytes,
    Objects,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::Bytes, Dimension::Objects];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::Objects => write!(f, "objects"),
        }
    }
}

/// What a usage or limit query addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaScope {
    Account(String),
    Container(String, String),
}

impl QuotaScope {
    pub fn account(&self) -> &str {
        match self {
            Self::Account(account) | Self::Container(account, _) => account,
        }
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(account) => write!(f, "account {account}"),
            Self::Container(account, container) => write!(f, "container {account}/{container}"),
        }
    }
}

/// Limits applied to accounts and containers that have none of their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDefaults {
    pub account: QuotaLimits,
    pub container: QuotaLimits,
}

/// Proof that a delta has been applied by `check_and_reserve`.
///
/// Releasing consumes the reservation, so it cannot be rolled back twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be kept or released"]
pub struct Reservation {
    pub(crate) account: String,
    pub(crate) container: String,
    pub(crate) delta: UsageDelta,
}

impl Reservation {
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn delta(&self) -> UsageDelta {
        self.delta
    }
}
