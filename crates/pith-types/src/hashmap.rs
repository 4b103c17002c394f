use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;

/// Ordered list of block hashes composing one object version.
///
/// Concatenating the blocks in order reproduces the object's bytes. The same
/// hash may appear more than once (repeated content); each occurrence holds
/// its own block reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hashmap(Vec<BlockHash>);

impl Hashmap {
    pub fn new(hashes: Vec<BlockHash>) -> Self {
        Self(hashes)
    }

    /// The hashmap of a zero-length object.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hashes(&self) -> &[BlockHash] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockHash> {
        self.0.iter()
    }

    pub fn push(&mut self, hash: BlockHash) {
        self.0.push(hash);
    }

    /// Number of references each distinct block holds from this hashmap.
    pub fn occurrences(&self) -> BTreeMap<BlockHash, u64> {
        let mut counts = BTreeMap::new();
        for hash in &self.0 {
            *counts.entry(*hash).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<BlockHash>> for Hashmap {
    fn from(hashes: Vec<BlockHash>) -> Self {
        Self(hashes)
    }
}

impl FromIterator<BlockHash> for Hashmap {
    fn from_iter<I: IntoIterator<Item = BlockHash>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Hashmap {
    type Item = &'a BlockHash;
    type IntoIter = std::slice::Iter<'a, BlockHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
