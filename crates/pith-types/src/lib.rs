//! Foundation types for the Pith object store.
//!
//! This crate provides the identifier, path, and temporal types shared by
//! every other Pith crate.
//!
//! # Key Types
//!
//! - [`BlockHash`] -- Content hash identifying an immutable block
//! - [`Hashmap`] -- Ordered list of block hashes composing one object version
//! - [`ObjectPath`] -- `account/container/name` address of an object
//! - [`Timestamp`] -- Millisecond timestamp with a logical tie-breaker
//! - [`VersioningPolicy`] -- How historical versions are retained

pub mod error;
pub mod hash;
pub mod hashmap;
pub mod path;
pub mod policy;
pub mod temporal;

pub use error::TypeError;
pub use hash::BlockHash;
pub use hashmap::Hashmap;
pub use path::ObjectPath;
pub use policy::VersioningPolicy;
pub use temporal::Timestamp;
