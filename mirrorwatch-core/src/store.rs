//! Durable key/value storage for the log queue mirror
//!
//! The agent rewrites its whole queue under one key on every append and
//! removes the key once a flush is confirmed. [`FileStore`] keeps one JSON
//! file per key under the data directory; [`MemoryStore`] is a shared map
//! for embedded hosts and tests. Both can enforce a byte quota.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Durable string storage keyed by name
pub trait LogStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was removed
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn save(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

fn check_quota(quota: Option<usize>, key: &str, size: usize) -> Result<()> {
    match quota {
        Some(limit) if size > limit => Err(Error::QuotaExceeded {
            key: key.to_string(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}

/// In-memory store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `limit` bytes
    pub fn with_quota(limit: usize) -> Self {
        Self {
            quota: Some(limit),
            ..Self::default()
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))
    }
}

impl LogStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        check_quota(self.quota, key, value.len())?;
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// One JSON file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota: None })
    }

    /// Reject values larger than `limit` bytes
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    /// File backing `key`; characters unsafe in file names become `_`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl LogStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        check_quota(self.quota, key, value.len())?;

        // Write-then-rename so a crash never leaves a half-written mirror
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("app_Logs").unwrap().is_none());

        store.save("app_Logs", "[]").unwrap();
        assert_eq!(store.load("app_Logs").unwrap().as_deref(), Some("[]"));

        // Clones share state
        let other = store.clone();
        other.remove("app_Logs").unwrap();
        assert!(store.load("app_Logs").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(4);
        assert!(store.save("k", "1234").is_ok());

        let err = store.save("k", "12345").unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { size: 5, limit: 4, .. }));
        assert_eq!(store.load("k").unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("mirror")).unwrap();

        store.save("app1_Logs", r#"[{"a":1}]"#).unwrap();
        assert!(store.path_for("app1_Logs").exists());
        assert_eq!(
            store.load("app1_Logs").unwrap().as_deref(),
            Some(r#"[{"a":1}]"#)
        );

        store.remove("app1_Logs").unwrap();
        assert!(store.load("app1_Logs").unwrap().is_none());
        // Removing again is fine
        store.remove("app1_Logs").unwrap();
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let path = store.path_for("../evil/app_Logs");
        assert_eq!(path.parent().unwrap(), temp.path());
        assert_eq!(path.file_name().unwrap(), ".._evil_app_Logs.json");
    }

    #[test]
    fn test_file_store_quota() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap().with_quota(2);
        assert!(store.save("k", "abc").is_err());
        assert!(store.load("k").unwrap().is_none());
    }
}
