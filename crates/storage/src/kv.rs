//! Local key-value store
//!
//! This module provides the persistent, string-keyed store that stands in for
//! browser `localStorage`. Values are stored as JSON so any `Serialize` type
//! can be written and read back across process restarts.

use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Local store configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database directory
    pub path: PathBuf,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Enable compression
    pub use_compression: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("eduquest_store.db"),
            cache_capacity: 8 * 1024 * 1024, // 8MB
            use_compression: false,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }
}

/// Persistent local store
///
/// Cloning a `LocalStore` is cheap: clones share the same underlying
/// database, so the API client and the theme service can write to one store.
///
/// # Examples
/// ```
/// use storage::LocalStore;
///
/// let store = LocalStore::in_memory().unwrap();
/// store.set("accessToken", &"abc").unwrap();
/// assert_eq!(store.get::<String>("accessToken").unwrap(), Some("abc".to_string()));
/// ```
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Db>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("len", &self.db.len()).finish()
    }
}

impl LocalStore {
    /// Open (or create) a store at the configured path
    pub fn open(config: StorageConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .use_compression(config.use_compression)
            .open()?;

        tracing::debug!(path = %config.path.display(), "opened local store");

        Ok(Self { db: Arc::new(db) })
    }

    /// Create a temporary store that is discarded on drop (for tests)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a value by key
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a value by key as untyped JSON
    pub fn get_raw(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get(key)
    }

    /// Set a value by key and flush it to disk
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&self, key: &str) -> Result<bool> {
        let existed = self.db.remove(key.as_bytes())?.is_some();
        if existed {
            self.db.flush()?;
        }
        Ok(existed)
    }

    /// Remove several keys at once, returning how many were present
    pub fn remove_many(&self, keys: &[&str]) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;

        for key in keys {
            if self.db.contains_key(key.as_bytes())? {
                removed += 1;
            }
            batch.remove(key.as_bytes());
        }

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(removed)
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// Remove every key
    pub fn clear(&self) -> Result<()> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Theme {
        name: String,
        primary: String,
    }

    #[test]
    fn test_set_and_get() {
        let store = LocalStore::in_memory().unwrap();

        store.set("accessToken", "A1").unwrap();
        let value: Option<String> = store.get("accessToken").unwrap();
        assert_eq!(value, Some("A1".to_string()));
    }

    #[test]
    fn test_get_missing_key() {
        let store = LocalStore::in_memory().unwrap();
        let value: Option<String> = store.get("missing").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_structured_value() {
        let store = LocalStore::in_memory().unwrap();
        let theme = Theme { name: "EduQuest".to_string(), primary: "#3B82F6".to_string() };

        store.set("temaConfig", &theme).unwrap();

        let loaded: Theme = store.get("temaConfig").unwrap().unwrap();
        assert_eq!(loaded, theme);

        let raw = store.get_raw("temaConfig").unwrap().unwrap();
        assert_eq!(raw["primary"], "#3B82F6");
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let store = LocalStore::in_memory().unwrap();
        store.set("temaConfig", "not a theme").unwrap();

        let result: Result<Option<Theme>> = store.get("temaConfig");
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_remove() {
        let store = LocalStore::in_memory().unwrap();
        store.set("refreshToken", "R1").unwrap();

        assert!(store.remove("refreshToken").unwrap());
        assert!(!store.remove("refreshToken").unwrap());
        assert!(!store.contains("refreshToken").unwrap());
    }

    #[test]
    fn test_remove_many() {
        let store = LocalStore::in_memory().unwrap();
        store.set("accessToken", "A1").unwrap();
        store.set("refreshToken", "R1").unwrap();
        store.set("temaConfig", &Theme { name: "x".into(), primary: "#000000".into() }).unwrap();

        let removed = store.remove_many(&["accessToken", "refreshToken", "absent"]).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("temaConfig").unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = LocalStore::in_memory().unwrap();
        let result = store.set("  ", "value");
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_clear() {
        let store = LocalStore::in_memory().unwrap();
        store.set("a", &1).unwrap();
        store.set("b", &2).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_data() {
        let store = LocalStore::in_memory().unwrap();
        let other = store.clone();

        store.set("accessToken", "shared").unwrap();
        assert_eq!(other.get::<String>("accessToken").unwrap(), Some("shared".to_string()));
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::new(temp_dir.path().join("store"));

        {
            let store = LocalStore::open(config.clone()).unwrap();
            store.set("refreshToken", "R1").unwrap();
        }

        let store = LocalStore::open(config).unwrap();
        assert_eq!(store.get::<String>("refreshToken").unwrap(), Some("R1".to_string()));
    }
}
