//! Durable key/value storage.
//!
//! The native counterpart of browser local storage: synchronous string keys
//! and values. Callers in this crate treat every failure as best-effort.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::error::{StorageError, StorageResult};

/// Key holding the persisted access token value.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key holding the persisted absolute expiry, epoch milliseconds as a string.
pub const ACCESS_TOKEN_EXPIRY_KEY: &str = "access_token_expiry";

/// Durable key/value store interface.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-memory key/value store.
///
/// Survives a [`crate::TokenStore`] being dropped and rebuilt, which is what
/// tests use to simulate a restart.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

/// JSON-file backed key/value store.
///
/// The whole map is rewritten on every change through a temporary file and a
/// rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    /// Use (and lazily create) the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        // Holds a bearer token: owner-only before it becomes visible.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// Store that refuses every operation, like disabled browser storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledKeyValueStore;

impl KeyValueStore for DisabledKeyValueStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}
