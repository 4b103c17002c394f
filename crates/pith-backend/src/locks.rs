use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use pith_types::ObjectPath;

use crate::error::{BackendError, BackendResult};

const STRIPES: usize = 256;

/// Striped per-path commit locks.
///
/// Commits to the same path serialize; commits to different paths contend
/// only when they hash to the same stripe.
pub struct PathLocks {
    stripes: Vec<Mutex<()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn lock(&self, path: &ObjectPath) -> BackendResult<MutexGuard<'_, ()>> {
        self.stripes[Self::stripe(path)]
            .lock()
            .map_err(|_| BackendError::Internal(format!("commit lock for {path} poisoned")))
    }

    fn stripe(path: &ObjectPath) -> usize {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        (hasher.finish() % STRIPES as u64) as usize
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}
