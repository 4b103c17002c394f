use std::collections::BTreeMap;
use std::fmt;

use pith_crypto::hashmap_root;
use pith_types::{BlockHash, Hashmap, ObjectPath, Timestamp};
use serde::{Deserialize, Serialize};

/// Content type assigned when a writer supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// User-visible object attributes carried by each version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_TYPE)
    }
}

/// An immutable snapshot of an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub path: ObjectPath,
    /// Strictly increasing per object, starting at 1.
    pub serial: u64,
    pub hashmap: Hashmap,
    pub size: u64,
    pub meta: ObjectMeta,
    /// First version of the current lineage (reset after a tombstone).
    pub created: Timestamp,
    /// When this version was written.
    pub modified: Timestamp,
    /// Tombstone marker.
    pub deleted: bool,
}

impl Version {
    /// Merkle root of the hashmap, used as the ETag.
    pub fn etag(&self) -> BlockHash {
        hashmap_root(&self.hashmap)
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }
}

/// Input to version creation; serial and timestamps are assigned by the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVersion {
    pub path: ObjectPath,
    pub hashmap: Hashmap,
    pub size: u64,
    pub meta: ObjectMeta,
    pub deleted: bool,
}

impl NewVersion {
    pub fn object(path: ObjectPath, hashmap: Hashmap, size: u64, meta: ObjectMeta) -> Self {
        Self {
            path,
            hashmap,
            size,
            meta,
            deleted: false,
        }
    }

    /// A deletion marker: empty hashmap, zero size.
    pub fn tombstone(path: ObjectPath) -> Self {
        Self {
            path,
            hashmap: Hashmap::empty(),
            size: 0,
            meta: ObjectMeta::default(),
            deleted: true,
        }
    }
}

/// Which version of an object a read addresses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionSelector {
    /// Latest published version; a tombstone reads as not found.
    #[default]
    Current,
    /// Exact serial, tombstones included.
    Serial(u64),
    /// Latest published version modified at or before this millisecond.
    AsOf(u64),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Serial(n) => write!(f, "serial {n}"),
            Self::AsOf(ms) => write!(f, "as of {ms}ms"),
        }
    }
}

/// Which historical versions a purge removes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurgeScope {
    /// Everything except the latest published version.
    AllButCurrent,
    /// Versions modified strictly before this millisecond, except the latest.
    Before(u64),
    /// All but the newest `n` published versions (at least one is kept).
    KeepLatest(usize),
    /// Exactly these serials (journal replay).
    Serials(Vec<u64>),
    /// Every published version, including the latest.
    All,
}
