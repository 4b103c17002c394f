use pith_types::BlockHash;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a block and a hashmap node with identical bytes never
/// share a digest.
pub struct BlockHasher {
    domain: &'static str,
}

impl BlockHasher {
    /// Hasher for block contents.
    pub const BLOCK: Self = Self {
        domain: "pith-block-v1",
    };
    /// Hasher for hashmap Merkle nodes.
    pub const HASHMAP: Self = Self {
        domain: "pith-hashmap-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> BlockHash {
        let mut hasher = self.start();
        hasher.update(data);
        BlockHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash several byte slices as if they were concatenated.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> BlockHash {
        let mut hasher = self.start();
        for part in parts {
            hasher.update(part);
        }
        BlockHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &BlockHash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}
