// src/storage.rs
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing;

use crate::errors::SwiftError;
use crate::models::sync::WriteKind;

// Error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage is full or rejected the write: {0}")]
    WriteRejected(String),
}

impl From<StorageError> for SwiftError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Serialization(msg) => SwiftError::JsonSerialization(msg),
            StorageError::Io(msg) | StorageError::WriteRejected(msg) => {
                SwiftError::StorageWrite(msg)
            }
        }
    }
}

/// Durable key/value storage for client-side state. Keys are namespaced
/// strings, values JSON documents. Writes complete before the call returns.
pub trait LocalStore: Send + Sync {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed read. A record that no longer parses is logged and treated as
/// absent rather than propagated, so stale app versions cannot wedge the UI.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.read_raw(key)? {
        Some(json) => match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!("Discarding corrupted record at '{}': {}", key, err);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json =
        serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    store.write_raw(key, &json)
}

// Key builders for the durable namespaces
pub struct StoreKeys;

impl StoreKeys {
    pub fn bookings() -> String {
        "swift:bookings".to_string()
    }

    pub fn active_booking() -> String {
        "swift:active_booking".to_string()
    }

    pub fn sync_queue(kind: WriteKind) -> String {
        match kind {
            WriteKind::ProblemReport => "swift:queue:problem_reports".to_string(),
            WriteKind::Rating => "swift:queue:ratings".to_string(),
        }
    }
}

// File-backed store, one document per key
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", file))
    }
}

impl LocalStore for FileStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn write_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        std::fs::write(&path, value).map_err(|e| StorageError::WriteRejected(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

// In-memory store for development and testing
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating a full quota.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl LocalStore for MemoryStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn write_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("quota exceeded".to_string()));
        }
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}
