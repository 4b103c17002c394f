//! Per-object version index for the Pith object store.
//!
//! Every object is an append-only chain of immutable [`Version`]s numbered
//! by a per-object serial starting at 1. Deleting an object appends a
//! tombstone; history stays queryable until it is purged.
//!
//! Writers go through a two-phase protocol: a version is first *staged*
//! (allocated but invisible to readers), then *published* or *discarded*.
//! [`VersionIndex::create_version`] does both in one atomic step.
//!
//! - `VersionIndex` trait boundary
//! - `InMemoryVersionIndex` implementation for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;
pub mod version;

pub use error::{IndexError, IndexResult};
pub use memory::InMemoryVersionIndex;
pub use traits::VersionIndex;
pub use version::{NewVersion, ObjectMeta, PurgeScope, Version, VersionSelector};
