//! Key-value persistence
//!
//! [`KeyValueStore`] is the durable store used as system of record. Values
//! are JSON documents addressed by string keys, fetched and written in
//! batches.

use crate::error::RedirectError;
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Durable key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Write all entries
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;
}

/// In-memory store, used for tests and ephemeral runs.
///
/// Failures can be switched on to exercise the error paths of callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Raw value of a key, bypassing failure injection
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(RedirectError::store(format!("read of {:?} failed", keys)));
        }
        Ok(keys
            .iter()
            .filter_map(|k| {
                self.entries
                    .get(*k)
                    .map(|v| (k.to_string(), v.value().clone()))
            })
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            let keys: Vec<&String> = entries.keys().collect();
            return Err(RedirectError::store(format!("write of {:?} failed", keys)));
        }
        for (key, value) in entries {
            self.entries.insert(key, value);
        }
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Writes go to a temporary file which is then renamed over the original.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let cache = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => {
                    return Err(RedirectError::store(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened store {} with {} keys", path.display(), cache.len());

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &Map<String, Value>) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let cache = self.cache.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| cache.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut updated = cache.clone();
        for (key, value) in entries {
            updated.insert(key, value);
        }
        self.persist(&updated).await?;
        *cache = updated;
        Ok(())
    }
}
