use pith_crypto::{ChunkError, TokenError};
use pith_index::IndexError;
use pith_quota::QuotaError;
use pith_store::StoreError;
use pith_types::{BlockHash, TypeError};
use thiserror::Error;

use crate::journal::JournalError;

/// Errors surfaced by the backend API.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(QuotaError),

    /// Concurrent writers kept winning; safe to retry.
    #[error("commit conflict on {path} after {attempts} attempts")]
    Conflict { path: String, attempts: u32 },

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{} referenced blocks are missing", .0.len())]
    MissingBlocks(Vec<BlockHash>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<StoreError> for BackendError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(hash) => Self::NotFound(format!("block {hash}")),
            StoreError::Integrity { .. } | StoreError::InvalidRefcount { .. } => {
                Self::Integrity(e.to_string())
            }
            StoreError::Io(_) | StoreError::LockPoisoned => Self::StorageIo(e.to_string()),
        }
    }
}

impl From<IndexError> for BackendError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotFound { .. } => Self::NotFound(e.to_string()),
            IndexError::Conflict { path, .. } => Self::Conflict {
                path: path.to_string(),
                attempts: 1,
            },
            IndexError::InvalidPath(inner) => Self::InvalidArgument(inner.to_string()),
            IndexError::NotPending { .. } => Self::Internal(e.to_string()),
            IndexError::LockPoisoned | IndexError::Storage(_) => Self::StorageIo(e.to_string()),
        }
    }
}

impl From<QuotaError> for BackendError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::QuotaExceeded { .. } => Self::QuotaExceeded(e),
            QuotaError::LockPoisoned | QuotaError::Storage(_) => Self::StorageIo(e.to_string()),
        }
    }
}

impl From<ChunkError> for BackendError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::InvalidBlockSize => Self::Config(e.to_string()),
            ChunkError::Io { .. } => Self::StorageIo(e.to_string()),
        }
    }
}

impl From<JournalError> for BackendError {
    fn from(e: JournalError) -> Self {
        Self::StorageIo(e.to_string())
    }
}

impl From<TypeError> for BackendError {
    fn from(e: TypeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<TokenError> for BackendError {
    fn from(e: TokenError) -> Self {
        Self::Config(e.to_string())
    }
}
