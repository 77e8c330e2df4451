//! Persistent cache adapter.
//!
//! `KvStore` is the raw key/value seam (file-backed on disk, in-memory for
//! tests).  `PersistentCache` layers the two typed entries the dashboard keeps
//! on top of it and swallows every failure: the cache is an optimisation and
//! is never allowed to break synchronization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{LogEntry, Progress};
use crate::reconcile::LogBuffer;

pub const LOGS_KEY: &str = "repost_logs";
pub const PROGRESS_KEY: &str = "repost_progress";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
    #[error("cache store unavailable")]
    Unavailable,
}

/// Raw string key/value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// One `<key>.json` file per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a half-written entry.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        for key in [LOGS_KEY, PROGRESS_KEY] {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Process-local store.  Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let map = self.map.lock().map_err(|_| CacheError::Unavailable)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut map = self.map.lock().map_err(|_| CacheError::Unavailable)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut map = self.map.lock().map_err(|_| CacheError::Unavailable)?;
        map.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut map = self.map.lock().map_err(|_| CacheError::Unavailable)?;
        map.clear();
        Ok(())
    }
}

/// Typed, best-effort view over a `KvStore`.
pub struct PersistentCache {
    store: Box<dyn KvStore>,
}

impl PersistentCache {
    pub fn new(store: impl KvStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Cached log buffer, already capped.  `None` when absent or unreadable.
    pub fn load_logs(&self) -> Option<LogBuffer> {
        let entries: Vec<LogEntry> = self.read(LOGS_KEY)?;
        Some(LogBuffer::from_entries(entries))
    }

    pub fn load_progress(&self) -> Option<Progress> {
        self.read(PROGRESS_KEY)
    }

    pub fn save_logs(&self, logs: &LogBuffer) {
        self.write(LOGS_KEY, logs);
    }

    pub fn save_progress(&self, progress: &Progress) {
        self.write(PROGRESS_KEY, progress);
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!("cache: clear failed: {}", e);
        }
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache: read {} failed: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("cache: discarding unreadable {}: {}", key, e);
                None
            }
        }
    }

    fn write<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(CacheError::from)
            .and_then(|json| self.store.set(key, &json));
        if let Err(e) = result {
            debug!("cache: write {} ignored: {}", key, e);
        }
    }
}
