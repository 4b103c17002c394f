use crate::types::{Dimension, QuotaScope};

/// Errors produced by quota ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("{scope} quota exceeded for {dimension}: usage {usage} + {requested} > limit {limit}")]
    QuotaExceeded {
        scope: QuotaScope,
        dimension: Dimension,
        usage: u64,
        requested: u64,
        limit: u64,
    },

    #[error("quota ledger lock poisoned")]
    LockPoisoned,

    #[error("quota storage error: {0}")]
    Storage(String),
}

/// Result alias for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;
