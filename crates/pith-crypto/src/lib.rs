//! Hashing and chunking primitives for the Pith object store.
//!
//! Provides domain-separated BLAKE3 block hashing, a fixed-size chunker that
//! turns byte streams into `(hash, block)` pairs, the Merkle root used as a
//! hashmap's ETag, and the random-word generator behind public object URLs.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chunker;
pub mod hasher;
pub mod merkle;
pub mod token;

pub use chunker::{ByteChunks, Chunk, ChunkError, Chunker, Chunks};
pub use hasher::BlockHasher;
pub use merkle::hashmap_root;
pub use token::{encode_word, random_word, TokenError, DEFAULT_ALPHABET};
