//! Durable persistence for cached tiles and storage-quota introspection
//!
//! The cache treats both as external collaborators: a byte store keyed by
//! `(category, date key, tile key)` and an optional source of `{quota, usage}`.

use super::grid::TileCoord;
use crate::core::date::DateKey;
use crate::data::crime::CrimeFeature;
use crate::prelude::{Arc, HashMap, Mutex};
use crate::{Result, TileError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::PoisonError;

/// The unit of cached and persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub category: String,
    pub date_key: DateKey,
    pub tile: TileCoord,
    /// Milliseconds since the Unix epoch of the last hit or write
    pub last_used: u64,
    pub payload: Vec<CrimeFeature>,
}

impl TileRecord {
    pub fn store_key(&self) -> StoreKey {
        StoreKey::new(&self.category, &self.date_key, self.tile)
    }
}

/// Compound key of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub category: String,
    pub date_key: String,
    /// `"{x}:{y}"`
    pub tile_key: String,
}

impl StoreKey {
    pub fn new(category: &str, date_key: &DateKey, tile: TileCoord) -> Self {
        Self {
            category: category.to_string(),
            date_key: date_key.to_string(),
            tile_key: tile.key(),
        }
    }
}

/// Key-value persistence for tile records.
///
/// Implementations must tolerate overlapping calls; writes to the same key are
/// applied in the order they were issued.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn put(&self, record: TileRecord) -> Result<()>;

    async fn get_all(&self) -> Result<Vec<TileRecord>>;

    async fn delete(&self, key: &StoreKey) -> Result<()>;
}

/// Non-persistent store, for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<StoreKey, TileRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.records
            .lock()
            .map(|records| records.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, record: TileRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.store_key(), record);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<TileRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    async fn delete(&self, key: &StoreKey) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(key);
        Ok(())
    }
}

const RECORD_EXTENSION: &str = "tile";

/// One `bincode` file per record inside a directory.
///
/// Writes go through a temporary file and a rename so readers never observe a
/// half-written record. A per-key async lock orders writes and deletes to the
/// same key; reads take no locks.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    key_locks: Mutex<HashMap<StoreKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            key_locks: Mutex::new(HashMap::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &StoreKey) -> Result<PathBuf> {
        let safe = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        if !safe(&key.category) || !safe(&key.date_key) {
            return Err(TileError::Storage(format!(
                "key {:?} cannot be used as a file name",
                key
            )));
        }
        let tile = key.tile_key.replace(':', "_");
        Ok(self.dir.join(format!(
            "{}.{}.{}.{}",
            key.category, key.date_key, tile, RECORD_EXTENSION
        )))
    }

    fn key_lock(&self, key: &StoreKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    fn release_key_lock(&self, key: &StoreKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        // Only the map still holds it: nobody else is waiting on this key.
        if locks.get(key).map(Arc::strong_count) == Some(1) {
            locks.remove(key);
        }
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn put(&self, record: TileRecord) -> Result<()> {
        let key = record.store_key();
        let path = self.path_for(&key)?;
        let bytes = bincode::serialize(&record)?;

        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
            match tokio::fs::write(&tmp, &bytes).await {
                Ok(()) => tokio::fs::rename(&tmp, &path).await,
                Err(e) => Err(e),
            }
        };
        self.release_key_lock(&key, lock);
        result.map_err(TileError::from)
    }

    async fn get_all(&self) -> Result<Vec<TileRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match bincode::deserialize::<TileRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("skipping unreadable tile record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    async fn delete(&self, key: &StoreKey) -> Result<()> {
        let path = self.path_for(key)?;
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };
        self.release_key_lock(key, lock);
        result.map_err(TileError::from)
    }
}

/// Storage capacity as reported by the environment, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub quota: u64,
    pub usage: u64,
}

impl StorageEstimate {
    pub fn available(&self) -> u64 {
        self.quota.saturating_sub(self.usage)
    }
}

/// Source of storage quota information
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate>;
}

/// Quota provider reporting a constant estimate
#[derive(Debug, Clone, Copy)]
pub struct FixedQuota(pub StorageEstimate);

impl FixedQuota {
    pub fn new(quota: u64, usage: u64) -> Self {
        Self(StorageEstimate { quota, usage })
    }
}

#[async_trait]
impl QuotaProvider for FixedQuota {
    async fn estimate(&self) -> Result<StorageEstimate> {
        Ok(self.0)
    }
}
