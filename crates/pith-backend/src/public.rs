use std::collections::HashMap;
use std::sync::RwLock;

use pith_crypto::random_word;
use pith_types::ObjectPath;
use tracing::debug;

use crate::error::{BackendError, BackendResult};

/// Tokens that expose objects through public URLs.
///
/// Each path has at most one token and each token maps back to exactly one
/// path.
pub struct PublicRegistry {
    security: usize,
    alphabet: String,
    inner: RwLock<PublicState>,
}

#[derive(Default)]
struct PublicState {
    by_path: HashMap<ObjectPath, String>,
    by_token: HashMap<String, ObjectPath>,
}

impl PublicRegistry {
    pub fn new(security: usize, alphabet: impl Into<String>) -> Self {
        Self {
            security,
            alphabet: alphabet.into(),
            inner: RwLock::new(PublicState::default()),
        }
    }

    /// Token for `path`, minting one if needed. The flag reports whether
    /// the token is new.
    pub fn publish(&self, path: &ObjectPath) -> BackendResult<(String, bool)> {
        let mut state = self.write()?;
        if let Some(token) = state.by_path.get(path) {
            return Ok((token.clone(), false));
        }
        let token = loop {
            let candidate = random_word(self.security, &self.alphabet)?;
            if !state.by_token.contains_key(&candidate) {
                break candidate;
            }
        };
        state.by_path.insert(path.clone(), token.clone());
        state.by_token.insert(token.clone(), path.clone());
        debug!(path = %path, "public token minted");
        Ok((token, true))
    }

    /// Register a known token (journal replay).
    pub fn insert(&self, path: ObjectPath, token: String) -> BackendResult<()> {
        let mut state = self.write()?;
        if let Some(old) = state.by_path.insert(path.clone(), token.clone()) {
            state.by_token.remove(&old);
        }
        state.by_token.insert(token, path);
        Ok(())
    }

    /// Remove the token of `path`, returning it if there was one.
    pub fn clear(&self, path: &ObjectPath) -> BackendResult<Option<String>> {
        let mut state = self.write()?;
        let token = state.by_path.remove(path);
        if let Some(token) = &token {
            state.by_token.remove(token);
        }
        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> BackendResult<Option<ObjectPath>> {
        Ok(self.read()?.by_token.get(token).cloned())
    }

    pub fn token(&self, path: &ObjectPath) -> BackendResult<Option<String>> {
        Ok(self.read()?.by_path.get(path).cloned())
    }

    fn read(&self) -> BackendResult<std::sync::RwLockReadGuard<'_, PublicState>> {
        self.inner
            .read()
            .map_err(|_| BackendError::Internal("public registry lock poisoned".into()))
    }

    fn write(&self) -> BackendResult<std::sync::RwLockWriteGuard<'_, PublicState>> {
        self.inner
            .write()
            .map_err(|_| BackendError::Internal("public registry lock poisoned".into()))
    }
}
