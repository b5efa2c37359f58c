//! Byte-level persistence backends.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Persists whole documents as opaque bytes.
///
/// Implementations must make `commit` atomic with respect to `load`: a load
/// running concurrently with, or after a crash during, a commit returns
/// either the previous bytes or the new bytes in full.
pub trait DocumentBackend: Send + Sync {
    /// Load the committed bytes for a key, `None` if never written.
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replace the bytes for a key.
    fn commit(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;
}

/// One `<key>.json` file per document inside a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a data directory.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the committed file for a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    #[cfg(unix)]
    fn sync_dir(&self, key: &str) -> StoreResult<()> {
        fs::File::open(&self.dir)
            .and_then(|d| d.sync_all())
            .map_err(|e| StoreError::io(key, e))
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }
}

impl DocumentBackend for FileBackend {
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn commit(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        // The temp file lives in the target directory so the final rename
        // never crosses a filesystem boundary.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", key))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| StoreError::io(key, e))?;

        tmp.write_all(bytes).map_err(|e| StoreError::io(key, e))?;
        tmp.flush().map_err(|e| StoreError::io(key, e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(key, e))?;

        let target = self.path_for(key);
        tmp.persist(&target).map_err(|e| StoreError::io(key, e.error))?;
        self.sync_dir(key)?;

        debug!(key, bytes = bytes.len(), path = %target.display(), "Document committed");
        Ok(())
    }
}

/// In-process backend; commits are a single map insert.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentBackend for MemoryBackend {
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.documents.get(key).map(|d| d.clone()))
    }

    fn commit(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.documents.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
