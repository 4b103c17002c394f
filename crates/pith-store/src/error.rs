use pith_types::BlockHash;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No block with this hash is known to the store.
    #[error("block not found: {0}")]
    NotFound(BlockHash),

    /// Stored or supplied bytes do not match their hash.
    #[error("integrity failure for block {hash}: {reason}")]
    Integrity { hash: BlockHash, reason: String },

    /// A decrement would take the reference count below zero.
    #[error("invalid refcount change for block {hash}: current {current}, requested -{requested}")]
    InvalidRefcount {
        hash: BlockHash,
        current: u64,
        requested: u64,
    },

    /// I/O error from the byte backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding the reference table was poisoned by a panic.
    #[error("block store lock poisoned")]
    LockPoisoned,
}

/// Result alias for block store operations.
pub type StoreResult<T> = Result<T, StoreError>;
