//! External cache collaborators.
//!
//! The aggregator treats the persistent cache as a plain key/value store.
//! Eviction and expiry are the backend's business; stale generations are
//! abandoned naturally because the cache key changes with the path set.

use anyhow::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key/value store for finished configuration values.
pub trait Storage {
    /// Look up a previously stored value. Absence is not an error.
    fn retrieve(&self, key: &str) -> anyhow::Result<Option<Value>>;

    fn store(&self, key: &str, value: &Value) -> anyhow::Result<()>;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn retrieve(&self, key: &str) -> anyhow::Result<Option<Value>> {
        (**self).retrieve(key)
    }

    fn store(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        (**self).store(key, value)
    }
}

/// Process-local store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("storage poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("storage poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn retrieve(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.entries.lock().expect("storage poisoned").get(key).cloned())
    }

    fn store(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("storage poisoned")
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pathname(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn retrieve(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let path = self.pathname(key);
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading cache entry {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("parsing cache entry {}", path.display()))?;
        Ok(Some(value))
    }

    fn store(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating cache directory {}", self.root.display()))?;
        let path = self.pathname(key);
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, content)
            .with_context(|| format!("writing cache entry {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.retrieve("missing").unwrap().is_none());

        storage.store("key", &json!({"a": 1})).unwrap();
        assert_eq!(storage.retrieve("key").unwrap(), Some(json!({"a": 1})));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn file_storage_round_trip() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path().join("cache"));

        assert!(storage.retrieve("abcd1234_app").unwrap().is_none());
        storage.store("abcd1234_app", &json!({"a": [1, 2]})).unwrap();
        assert_eq!(
            storage.retrieve("abcd1234_app").unwrap(),
            Some(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn file_storage_corrupt_entry_errors() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        std::fs::write(temp.path().join("bad.json"), "not json").unwrap();
        assert!(storage.retrieve("bad").is_err());
    }
}
