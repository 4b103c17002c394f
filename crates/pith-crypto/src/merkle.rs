use pith_types::{BlockHash, Hashmap};

use crate::hasher::BlockHasher;

/// Merkle root over a hashmap's block hashes.
///
/// The root is the object's content fingerprint (ETag): it depends only on
/// the ordered block list, so identical payloads chunked with the same block
/// size share a root. An empty hashmap hashes the empty string in the
/// hashmap domain. A single block is its own root. An odd node at any level
/// is paired with itself.
pub fn hashmap_root(hashmap: &Hashmap) -> BlockHash {
    let leaves = hashmap.hashes();
    if leaves.is_empty() {
        return BlockHasher::HASHMAP.hash(b"");
    }

    let mut current: Vec<BlockHash> = leaves.to_vec();
    while current.len() > 1 {
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        for pair in current.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        current = next;
    }
    current[0]
}

fn hash_pair(left: &BlockHash, right: &BlockHash) -> BlockHash {
    BlockHasher::HASHMAP.hash_parts(&[left.as_bytes(), right.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Hashmap {
        (0..n)
            .map(|i| BlockHasher::BLOCK.hash(format!("block-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn empty_hashmap_has_fixed_root() {
        let root = hashmap_root(&Hashmap::empty());
        assert_eq!(root, BlockHasher::HASHMAP.hash(b""));
        assert!(!root.is_zero());
    }

    #[test]
    fn single_block_is_own_root() {
        let map = leaves(1);
        assert_eq!(hashmap_root(&map), map.hashes()[0]);
    }

    #[test]
    fn two_blocks_hash_as_pair() {
        let map = leaves(2);
        let expected = hash_pair(&map.hashes()[0], &map.hashes()[1]);
        assert_eq!(hashmap_root(&map), expected);
    }

    #[test]
    fn odd_node_pairs_with_itself() {
        let map = leaves(3);
        let h = map.hashes();
        let expected = hash_pair(&hash_pair(&h[0], &h[1]), &hash_pair(&h[2], &h[2]));
        assert_eq!(hashmap_root(&map), expected);
    }

    #[test]
    fn order_matters() {
        let map = leaves(4);
        let mut reversed: Vec<BlockHash> = map.hashes().to_vec();
        reversed.reverse();
        assert_ne!(hashmap_root(&map), hashmap_root(&Hashmap::new(reversed)));
    }

    #[test]
    fn deterministic_for_large_maps() {
        let map = leaves(1000);
        assert_eq!(hashmap_root(&map), hashmap_root(&map.clone()));
    }
}
