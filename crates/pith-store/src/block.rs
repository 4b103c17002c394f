use serde::{Deserialize, Serialize};

/// How `put` treats bytes offered for a hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// Re-hash bytes on every put and get; mismatches are integrity errors.
    #[default]
    Verify,
    /// Trust the caller-supplied hash.
    TrustHash,
}

/// Result of a successful `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// Reference count after the put.
    pub refcount: u64,
    /// Whether this put wrote the block's bytes for the first time.
    pub created: bool,
}

/// Size and reference count of a stored block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub size: u64,
    pub refcount: u64,
}

/// Summary of a reclamation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Blocks inspected.
    pub examined: u64,
    /// Zero-reference blocks deleted.
    pub reclaimed: u64,
    /// Bytes released by the deletions.
    pub bytes_freed: u64,
}

impl ReclaimReport {
    pub fn merge(&mut self, other: ReclaimReport) {
        self.examined += other.examined;
        self.reclaimed += other.reclaimed;
        self.bytes_freed += other.bytes_freed;
    }
}
