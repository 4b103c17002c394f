//! Refcounted content-addressed block storage for the Pith object store.
//!
//! Every object version is a list of block hashes; the bytes behind those
//! hashes live here, deduplicated. A block is written once, shared by every
//! hashmap that references it, and counted once per reference. Reaching a
//! count of zero never deletes anything inline: [`BlockStore::reclaim`]
//! removes unreferenced blocks in a separate pass.
//!
//! # Backends
//!
//! Byte storage is pluggable through [`BlockBackend`]:
//!
//! - [`MemoryBackend`] -- `HashMap`-based, for tests and embedding
//! - [`FsBackend`] -- sharded directory with atomic temp-file writes
//!
//! [`RefCountedBlockStore`] layers the reference table over either one.
//!
//! # Design Rules
//!
//! 1. Block bytes are immutable once written.
//! 2. Write-then-count: bytes are durable before the count becomes non-zero.
//! 3. Operations on the same hash are serialized on that hash's lock stripe.
//! 4. Reads of block bytes take no table lock.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod block;
pub mod error;
pub mod fs;
pub mod memory;
pub mod refcount;
pub mod traits;

pub use block::{BlockInfo, IntegrityPolicy, PutOutcome, ReclaimReport};
pub use error::{StoreError, StoreResult};
pub use fs::{FsBackend, FsyncPolicy};
pub use memory::MemoryBackend;
pub use refcount::RefCountedBlockStore;
pub use traits::{BlockBackend, BlockStore};
