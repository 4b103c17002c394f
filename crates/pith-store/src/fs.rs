use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use pith_types::BlockHash;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::StoreResult;
use crate::traits::BlockBackend;

/// Prefix of in-flight block files. Anything carrying it after a crash is
/// garbage.
const TEMP_PREFIX: &str = ".tmp-";

/// When block writes are flushed to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsyncPolicy {
    /// fsync the block file and its shard directory on every write.
    #[default]
    Always,
    /// Leave flushing to the OS.
    Never,
}

/// Filesystem byte backend.
///
/// Blocks are stored at `{root}/{aa}/{bb}/{hex}` where `aa` and `bb` are the
/// first two byte pairs of the hex hash. Writes land in a temporary file in
/// the shard directory and are renamed into place, so a block file is either
/// absent or complete.
#[derive(Debug)]
pub struct FsBackend {
    root: PathBuf,
    fsync: FsyncPolicy,
}

impl FsBackend {
    /// Open (creating if needed) a block directory, removing temporary files
    /// left by interrupted writes.
    pub fn open(root: impl AsRef<Path>, fsync: FsyncPolicy) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let backend = Self { root, fsync };
        let removed = backend.recover()?;
        info!(root = %backend.root.display(), removed_temp_files = removed, "opened block directory");
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a block.
    pub fn block_path(&self, hash: &BlockHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    fn recover(&self) -> StoreResult<u64> {
        let mut removed = 0;
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with(TEMP_PREFIX) {
                warn!(path = %entry.path().display(), "removing interrupted block write");
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn sync_dir(dir: &Path) -> io::Result<()> {
        fs::File::open(dir)?.sync_all()
    }
}

impl BlockBackend for FsBackend {
    fn write(&self, hash: &BlockHash, data: &Bytes) -> StoreResult<()> {
        let path = self.block_path(hash);
        if path.exists() {
            return Ok(());
        }
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block path has no parent"))?;
        fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        file.write_all(data)?;
        if self.fsync == FsyncPolicy::Always {
            file.as_file().sync_all()?;
        }
        file.persist(&path).map_err(|e| e.error)?;
        if self.fsync == FsyncPolicy::Always {
            Self::sync_dir(dir)?;
        }

        debug!(hash = %hash.short_hex(), size = data.len(), "wrote block file");
        Ok(())
    }

    fn read(&self, hash: &BlockHash) -> StoreResult<Option<Bytes>> {
        match fs::read(self.block_path(hash)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, hash: &BlockHash) -> StoreResult<bool> {
        match fs::remove_file(self.block_path(hash)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, hash: &BlockHash) -> StoreResult<bool> {
        Ok(self.block_path(hash).is_file())
    }

    fn list(&self) -> StoreResult<Vec<(BlockHash, u64)>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            match BlockHash::from_hex(&name) {
                Ok(hash) => out.push((hash, entry.metadata().map_err(io::Error::from)?.len())),
                Err(_) => debug!(path = %entry.path().display(), "ignoring non-block file"),
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(fsync: FsyncPolicy) -> (TempDir, FsBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::open(dir.path().join("blocks"), fsync).unwrap();
        (dir, backend)
    }

    #[test]
    fn blocks_are_sharded() {
        let (_dir, backend) = setup(FsyncPolicy::Never);
        let h = BlockHash::from_bytes(b"shard me");
        backend.write(&h, &Bytes::from_static(b"shard me")).unwrap();

        let hex = h.to_hex();
        let expected = backend.root().join(&hex[0..2]).join(&hex[2..4]).join(&hex);
        assert_eq!(backend.block_path(&h), expected);
        assert!(expected.is_file());
    }

    #[test]
    fn write_read_delete_roundtrip() {
        let (_dir, backend) = setup(FsyncPolicy::Always);
        let h = BlockHash::from_bytes(b"payload");
        backend.write(&h, &Bytes::from_static(b"payload")).unwrap();
        assert!(backend.exists(&h).unwrap());
        assert_eq!(&backend.read(&h).unwrap().unwrap()[..], b"payload");
        assert!(backend.delete(&h).unwrap());
        assert!(!backend.exists(&h).unwrap());
        assert!(backend.read(&h).unwrap().is_none());
        assert!(!backend.delete(&h).unwrap());
    }

    #[test]
    fn list_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("blocks");
        let h1 = BlockHash::from_bytes(b"one");
        let h2 = BlockHash::from_bytes(b"three");
        {
            let backend = FsBackend::open(&root, FsyncPolicy::Never).unwrap();
            backend.write(&h1, &Bytes::from_static(b"one")).unwrap();
            backend.write(&h2, &Bytes::from_static(b"three")).unwrap();
        }
        let backend = FsBackend::open(&root, FsyncPolicy::Never).unwrap();
        let mut expected = vec![(h1, 3), (h2, 5)];
        expected.sort();
        assert_eq!(backend.list().unwrap(), expected);
    }

    #[test]
    fn open_removes_temp_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("blocks");
        let shard = root.join("ab").join("cd");
        fs::create_dir_all(&shard).unwrap();
        let leftover = shard.join(format!("{TEMP_PREFIX}interrupted"));
        fs::write(&leftover, b"half a block").unwrap();

        let backend = FsBackend::open(&root, FsyncPolicy::Never).unwrap();
        assert!(!leftover.exists());
        assert!(backend.list().unwrap().is_empty());
    }

    #[test]
    fn stray_files_are_not_blocks() {
        let (_dir, backend) = setup(FsyncPolicy::Never);
        let shard = backend.root().join("00").join("11");
        fs::create_dir_all(&shard).unwrap();
        fs::write(shard.join("README"), b"not a block").unwrap();
        assert!(backend.list().unwrap().is_empty());
    }
}
