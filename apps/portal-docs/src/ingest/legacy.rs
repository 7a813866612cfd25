//! Legacy flat key-value storage
//!
//! Before the versioned cache existed, newsletters were kept as a single JSON
//! array under one key of a flat key-value blob. On disk that blob is a JSON
//! object file, one entry per key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default key the newsletters were stored under
pub const DEFAULT_LEGACY_KEY: &str = "newsletters";

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt legacy storage at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal flat key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw value under `key`, if present
    async fn get(&self, key: &str) -> Result<Option<String>, LegacyError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), LegacyError>;

    /// Remove `key`; absent keys are ignored
    async fn remove(&self, key: &str) -> Result<(), LegacyError>;
}

/// Key-value store persisted as a JSON object file
///
/// A missing file reads as an empty store. Writes go through a temporary
/// file and a rename so readers never see a half-written blob.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, Value>, LegacyError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| LegacyError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_map(&self, map: &BTreeMap<String, Value>) -> Result<(), LegacyError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(map).map_err(|source| LegacyError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LegacyError> {
        let _guard = self.lock.lock().await;
        let map = self.read_map().await?;

        Ok(map.get(key).map(|value| match value {
            // Values written by the old client were JSON strings holding JSON
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LegacyError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), LegacyError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;

        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
