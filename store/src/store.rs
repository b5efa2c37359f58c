//! Typed document store with per-key serialization of updates.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::backend::{DocumentBackend, FileBackend, MemoryBackend};
use crate::error::{StoreError, StoreResult};

/// Logical identifier of a document.
///
/// Restricted to ASCII alphanumerics, `_` and `-` so that it maps to a single
/// file name without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(name: impl Into<String>) -> StoreResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON document store.
///
/// Reads never take a lock; atomic commits guarantee they see a complete
/// document. Updates on the same key are serialized by a per-key mutex.
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    /// Per-key update locks
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentStore {
    /// Create a store over an arbitrary backend.
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
        }
    }

    /// File-backed store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(FileBackend::open(dir)?)))
    }

    /// Store that keeps documents in memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Read the last committed document, or `T::default()` if none exists.
    #[instrument(skip(self), fields(key = %key))]
    pub fn read<T>(&self, key: &DocumentKey) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        self.load(key)
    }

    /// Replace a document wholesale.
    ///
    /// Prefer [`DocumentStore::update`] when the new content depends on the
    /// old one; `write` does not serialize against concurrent updates.
    #[instrument(skip(self, document), fields(key = %key))]
    pub fn write<T>(&self, key: &DocumentKey, document: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock();
        self.commit(key, document)
    }

    /// Read-modify-write a document under the key's lock.
    ///
    /// If `f` returns an error, nothing is persisted and the error is
    /// returned unchanged.
    pub fn update<T, R, E, F>(&self, key: &DocumentKey, f: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned + Default,
        E: From<StoreError>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock();

        let mut document: T = self.load(key)?;
        let result = f(&mut document)?;
        self.commit(key, &document)?;

        debug!(key = %key, "Document updated");
        Ok(result)
    }

    fn lock_for(&self, key: &DocumentKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load<T>(&self, key: &DocumentKey) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.backend.load(key.as_str())? {
            None => Ok(T::default()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!(key = %key, error = %e, "Document failed to parse");
                StoreError::StorageCorruption {
                    key: key.as_str().to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    fn commit<T>(&self, key: &DocumentKey, document: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        // Serialize fully before touching the backend.
        let bytes =
            serde_json::to_vec_pretty(document).map_err(|e| StoreError::Serialization {
                key: key.as_str().to_string(),
                reason: e.to_string(),
            })?;
        self.backend.commit(key.as_str(), &bytes)
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serializer};
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::thread;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
        #[serde(default)]
        tags: BTreeMap<String, u64>,
    }

    fn key(name: &str) -> DocumentKey {
        DocumentKey::new(name).unwrap()
    }

    #[test]
    fn test_key_validation() {
        assert!(DocumentKey::new("exchange_rates").is_ok());
        assert!(DocumentKey::new("").is_err());
        assert!(DocumentKey::new("../etc/passwd").is_err());
        assert!(DocumentKey::new("rates.json").is_err());
    }

    #[test]
    fn test_read_missing_returns_default() {
        let store = DocumentStore::in_memory();
        let doc: Counter = store.read(&key("counter")).unwrap();
        assert_eq!(doc, Counter::default());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let doc = Counter {
            value: 7,
            ..Default::default()
        };

        store.write(&key("counter"), &doc).unwrap();

        let reopened = DocumentStore::open(dir.path()).unwrap();
        let read: Counter = reopened.read(&key("counter")).unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn test_update_error_persists_nothing() {
        let store = DocumentStore::in_memory();
        let k = key("counter");
        store.write(&k, &Counter { value: 1, ..Default::default() }).unwrap();

        let result: Result<(), StoreError> = store.update(&k, |doc: &mut Counter| {
            doc.value = 99;
            Err(StoreError::InvalidKey("rejected".into()))
        });

        assert!(result.is_err());
        let read: Counter = store.read(&k).unwrap();
        assert_eq!(read.value, 1);
    }

    #[test]
    fn test_corrupted_document_is_reported_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{\"users\": [1, 2").unwrap();

        let store = DocumentStore::open(dir.path()).unwrap();
        let err = store.read::<Counter>(&key("users")).unwrap_err();
        assert!(err.is_corruption());

        let update: Result<(), StoreError> =
            store.update(&key("users"), |doc: &mut Counter| {
                doc.value += 1;
                Ok(())
            });
        assert!(update.unwrap_err().is_corruption());

        assert_eq!(std::fs::read(&path).unwrap(), b"{\"users\": [1, 2");
    }

    #[test]
    fn test_interrupted_write_leaves_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let k = key("rates");
        store.write(&k, &Counter { value: 5, ..Default::default() }).unwrap();

        // A process killed before the rename leaves a half-written temp file.
        let mut leftover = tempfile::Builder::new()
            .prefix(".rates.")
            .suffix(".tmp")
            .tempfile_in(dir.path())
            .unwrap();
        leftover.write_all(b"{\"value\": 6, \"ta").unwrap();
        let (_file, _path) = leftover.keep().unwrap();

        let read: Counter = store.read(&k).unwrap();
        assert_eq!(read.value, 5);

        store
            .update(&k, |doc: &mut Counter| {
                doc.value += 1;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        let read: Counter = store.read(&k).unwrap();
        assert_eq!(read.value, 6);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    #[test]
    fn test_serialization_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        let k = key("rates");
        store.write(&k, &Counter { value: 3, ..Default::default() }).unwrap();

        let err = store.write(&k, &Unserializable).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));

        let read: Counter = store.read(&k).unwrap();
        assert_eq!(read.value, 3);
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::open(dir.path()).unwrap());
        let k = key("counter");

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                let k = k.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(&k, |doc: &mut Counter| {
                                doc.value += 1;
                                *doc.tags.entry(format!("w{}", worker)).or_default() += 1;
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let read: Counter = store.read(&k).unwrap();
        assert_eq!(read.value, 200);
        assert!(read.tags.values().all(|&n| n == 25));
    }

    #[test]
    fn test_distinct_keys_do_not_share_locks() {
        let store = DocumentStore::in_memory();
        let a = store.lock_for(&key("a"));
        let b = store.lock_for(&key("b"));

        let _held = a.lock();
        assert!(b.try_lock().is_some());
        assert!(a.try_lock().is_none());
    }
}
