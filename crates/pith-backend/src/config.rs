use std::path::{Path, PathBuf};

use pith_crypto::DEFAULT_ALPHABET;
use pith_quota::{AccountingPolicy, LedgerDefaults, QuotaLimits};
use pith_store::{FsyncPolicy, IntegrityPolicy};
use pith_types::VersioningPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};
use crate::journal::SyncMode;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Backend configuration.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes. Quota values of `0` mean unlimited. Without `block_path` blocks
/// live in memory; without `journal_path` nothing is journaled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Chunk size for new objects, in bytes.
    pub block_size: usize,
    pub versioning: VersioningPolicy,
    /// Whether historical versions are exempt from quota.
    pub free_versioning: bool,
    /// Under `auto` versioning, keep at most this many versions per object.
    pub max_versions: Option<usize>,

    /// Default account byte quota.
    pub account_quota: u64,
    pub account_max_objects: u64,
    /// Default container byte quota.
    pub container_quota: u64,
    pub container_max_objects: u64,

    pub integrity: IntegrityPolicy,
    pub fsync: FsyncPolicy,
    pub journal_sync: SyncMode,

    /// Conflict retries before a commit gives up.
    pub max_commit_retries: u32,
    /// Base backoff between conflict retries; grows linearly per attempt.
    pub retry_backoff_ms: u64,

    /// Random bytes behind each public URL token.
    pub public_url_security: usize,
    pub public_url_alphabet: String,

    pub block_path: Option<PathBuf>,
    pub journal_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            block_size: (4 * MIB) as usize,
            versioning: VersioningPolicy::Auto,
            free_versioning: true,
            max_versions: None,
            account_quota: 50 * GIB,
            account_max_objects: 0,
            container_quota: 0,
            container_max_objects: 0,
            integrity: IntegrityPolicy::Verify,
            fsync: FsyncPolicy::Always,
            journal_sync: SyncMode::EveryWrite,
            max_commit_retries: 3,
            retry_backoff_ms: 10,
            public_url_security: 16,
            public_url_alphabet: DEFAULT_ALPHABET.to_string(),
            block_path: None,
            journal_path: None,
        }
    }
}

impl BackendConfig {
    /// Configuration rooted in a data directory: blocks under `blocks/`,
    /// journal at `journal.log`.
    pub fn persistent(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            block_path: Some(dir.join("blocks")),
            journal_path: Some(dir.join("journal.log")),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> BackendResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| BackendError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BackendError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> BackendResult<String> {
        toml::to_string_pretty(self).map_err(|e| BackendError::Config(e.to_string()))
    }

    pub fn validate(&self) -> BackendResult<()> {
        if self.block_size == 0 {
            return Err(BackendError::Config("block_size must be greater than zero".into()));
        }
        if self.public_url_security == 0 {
            return Err(BackendError::Config(
                "public_url_security must be greater than zero".into(),
            ));
        }
        if self.public_url_alphabet.chars().count() < 2 {
            return Err(BackendError::Config(
                "public_url_alphabet needs at least two symbols".into(),
            ));
        }
        if self.max_versions == Some(0) {
            return Err(BackendError::Config("max_versions must be at least 1".into()));
        }
        if self.journal_path.is_some() && self.block_path.is_none() {
            return Err(BackendError::Config(
                "a journal needs persistent blocks: set block_path".into(),
            ));
        }
        Ok(())
    }

    pub fn ledger_defaults(&self) -> LedgerDefaults {
        LedgerDefaults {
            account: QuotaLimits::from_config(self.account_quota, self.account_max_objects),
            container: QuotaLimits::from_config(self.container_quota, self.container_max_objects),
        }
    }

    pub fn accounting_policy(&self) -> AccountingPolicy {
        AccountingPolicy::new(self.versioning, self.free_versioning)
    }
}
