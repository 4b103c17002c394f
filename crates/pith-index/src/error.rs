use pith_types::{ObjectPath, TypeError};

use crate::version::VersionSelector;

/// Errors produced by version index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("no version of {path} matches {selector}")]
    NotFound {
        path: ObjectPath,
        selector: VersionSelector,
    },

    #[error("version conflict on {path}: expected head {expected:?}, found {actual:?}")]
    Conflict {
        path: ObjectPath,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("version {serial} of {path} is not pending")]
    NotPending { path: ObjectPath, serial: u64 },

    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    #[error("index lock poisoned")]
    LockPoisoned,

    #[error("index storage error: {0}")]
    Storage(String),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
