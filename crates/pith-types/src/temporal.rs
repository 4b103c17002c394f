use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp with a logical tie-breaker.
///
/// Two versions of the same object may be written within the same
/// millisecond; the logical counter keeps their timestamps strictly ordered.
///
/// Ordering: `physical_ms` → `logical`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Counter for events within the same millisecond.
    pub logical: u32,
}

impl Timestamp {
    pub fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self {
            physical_ms: now_ms(),
            logical: 0,
        }
    }

    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
        }
    }

    /// A timestamp strictly after `previous`, tracking the wall clock when
    /// it has moved forward.
    pub fn next_after(previous: &Self) -> Self {
        let now = now_ms();
        if now > previous.physical_ms {
            Self::new(now, 0)
        } else {
            Self::new(previous.physical_ms, previous.logical.saturating_add(1))
        }
    }

    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms.{})", self.physical_ms, self.logical)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms, self.logical)
    }
}
