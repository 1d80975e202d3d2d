use super::grid::TileCoord;
use super::store::{DurableStore, QuotaProvider, StoreKey, TileRecord};
use crate::core::config::TileCacheConfig;
use crate::core::date::DateKey;
use crate::data::crime::CrimeFeature;
use crate::prelude::{Arc, Mutex};
use crate::{Result, TileError};
use lru::LruCache;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of one fetchable, cacheable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub category: String,
    pub date_key: DateKey,
    pub tile: TileCoord,
}

impl CacheKey {
    pub fn new(category: impl Into<String>, date_key: DateKey, tile: TileCoord) -> Self {
        Self {
            category: category.into(),
            date_key,
            tile,
        }
    }

    pub fn store_key(&self) -> StoreKey {
        StoreKey::new(&self.category, &self.date_key, self.tile)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.date_key, self.tile.key())
    }
}

/// Millisecond timestamp source
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
struct CachedTile {
    last_used: u64,
    payload: Arc<Vec<CrimeFeature>>,
}

/// Keyed store of fetched tiles with LRU tracking, durable persistence and
/// quota-aware eviction.
///
/// The in-memory index answers every lookup and is authoritative for the
/// session; the durable store is written through on every change and read back
/// only by [`TileCache::init_from_durable_store`]. Durable failures are reported
/// to the caller but never roll back the in-memory index.
#[derive(Clone)]
pub struct TileCache {
    /// Recency order is LRU-first when iterated in reverse
    tiles: Arc<Mutex<LruCache<CacheKey, CachedTile>>>,
    store: Arc<dyn DurableStore>,
    quota: Option<Arc<dyn QuotaProvider>>,
    config: TileCacheConfig,
    clock: Clock,
    /// Set once the durable store has been read back
    initialised: Arc<AtomicBool>,
}

impl TileCache {
    /// Create an empty cache. Writes are refused until
    /// [`TileCache::init_from_durable_store`] has run; prefer [`TileCache::open`].
    pub fn new(
        store: Arc<dyn DurableStore>,
        quota: Option<Arc<dyn QuotaProvider>>,
        config: TileCacheConfig,
    ) -> Self {
        Self {
            tiles: Arc::new(Mutex::new(LruCache::unbounded())),
            store,
            quota,
            config,
            clock: Arc::new(system_clock),
            initialised: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a cache and load everything the durable store holds
    pub async fn open(
        store: Arc<dyn DurableStore>,
        quota: Option<Arc<dyn QuotaProvider>>,
        config: TileCacheConfig,
    ) -> Result<Self> {
        let cache = Self::new(store, quota, config);
        cache.init_from_durable_store().await?;
        Ok(cache)
    }

    /// Replace the timestamp source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    /// Whether [`TileCache::init_from_durable_store`] has run
    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    fn ensure_initialised(&self) -> Result<()> {
        if self.is_initialised() {
            Ok(())
        } else {
            Err(TileError::Uninitialised)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CachedTile>> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the in-memory index from the durable store.
    ///
    /// The index is replaced wholesale, so calling this twice never duplicates
    /// entries. Returns the number of records loaded. A store that cannot be
    /// read still leaves the cache usable, empty and memory-only.
    pub async fn init_from_durable_store(&self) -> Result<usize> {
        let records = self.store.get_all().await;
        self.initialised.store(true, Ordering::Release);
        let mut records = records?;
        records.sort_by_key(|record| record.last_used);

        let mut tiles = LruCache::unbounded();
        for TileRecord {
            category,
            date_key,
            tile,
            last_used,
            payload,
        } in records
        {
            tiles.put(
                CacheKey::new(category, date_key, tile),
                CachedTile {
                    last_used,
                    payload: Arc::new(payload),
                },
            );
        }

        let loaded = tiles.len();
        *self.lock() = tiles;
        log::info!("TileCache: loaded {} tiles from durable store", loaded);
        Ok(loaded)
    }

    /// Membership check against the in-memory index only
    pub fn is_loaded(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    /// Cached payload, without touching recency
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<CrimeFeature>>> {
        self.lock().peek(key).map(|tile| tile.payload.clone())
    }

    /// Last-used timestamp of a cached tile
    pub fn last_used(&self, key: &CacheKey) -> Option<u64> {
        self.lock().peek(key).map(|tile| tile.last_used)
    }

    /// Insert or overwrite a tile and persist it.
    ///
    /// The tile is visible to [`TileCache::is_loaded`] before this returns
    /// control to the executor; the returned result only reports whether the
    /// durable write succeeded.
    pub async fn mark_loaded(&self, key: CacheKey, payload: Vec<CrimeFeature>) -> Result<()> {
        self.ensure_initialised()?;
        let now = (self.clock)();
        let payload = Arc::new(payload);
        let last_used = {
            let mut tiles = self.lock();
            let last_used = tiles
                .peek(&key)
                .map(|tile| tile.last_used.max(now))
                .unwrap_or(now);
            tiles.put(
                key.clone(),
                CachedTile {
                    last_used,
                    payload: payload.clone(),
                },
            );
            last_used
        };

        let record = TileRecord {
            category: key.category.clone(),
            date_key: key.date_key.clone(),
            tile: key.tile,
            last_used,
            payload: payload.as_ref().clone(),
        };
        self.store.put(record).await.map_err(|e| {
            log::warn!("TileCache: tile {} kept in memory only: {}", key, e);
            e
        })
    }

    /// Refresh a tile's last-used timestamp; `false` if it is not cached
    pub fn touch(&self, key: &CacheKey) -> bool {
        let now = (self.clock)();
        match self.lock().get_mut(key) {
            Some(tile) => {
                tile.last_used = tile.last_used.max(now);
                true
            }
            None => false,
        }
    }

    /// Remove a tile from memory and from the durable store
    pub async fn evict_one(&self, key: &CacheKey) -> Result<()> {
        self.ensure_initialised()?;
        self.lock().pop(key);
        self.delete_durable(key).await
    }

    async fn delete_durable(&self, key: &CacheKey) -> Result<()> {
        self.store.delete(&key.store_key()).await.map_err(|e| {
            log::warn!("TileCache: failed to delete {} from durable store: {}", key, e);
            e
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated footprint of the cache in bytes
    pub fn estimated_bytes(&self) -> u64 {
        self.len() as u64 * self.config.bytes_per_record
    }

    /// Bytes available for the cache, falling back to a fixed ceiling when the
    /// environment cannot say
    pub async fn available_quota(&self) -> u64 {
        match &self.quota {
            Some(provider) => match provider.estimate().await {
                Ok(estimate) => estimate.available(),
                Err(e) => {
                    log::debug!(
                        "quota estimate failed ({}), falling back to {} bytes",
                        e,
                        self.config.fallback_quota_bytes
                    );
                    self.config.fallback_quota_bytes
                }
            },
            None => self.config.fallback_quota_bytes,
        }
    }

    /// Evict least-recently-used tiles once the estimated footprint exceeds the
    /// purge threshold, until it is at or below the purge target.
    ///
    /// Victims are ordered by last-used timestamp, ties broken by recency order.
    /// They leave the in-memory index in a single step; only the durable
    /// deletes are awaited afterwards. Returns the keys that were evicted.
    pub async fn purge_if_needed(&self) -> Vec<CacheKey> {
        if !self.is_initialised() {
            log::debug!("TileCache: purge skipped before init");
            return Vec::new();
        }

        let available = self.available_quota().await as f64;
        let bytes_per_record = self.config.bytes_per_record;

        let victims: Vec<CacheKey> = {
            let mut tiles = self.lock();
            let count = tiles.len() as u64;
            let estimated = (count * bytes_per_record) as f64;
            if estimated <= available * self.config.purge_threshold {
                return Vec::new();
            }

            let keep = (available * self.config.purge_target / bytes_per_record as f64).floor() as u64;
            let excess = count.saturating_sub(keep) as usize;

            let mut candidates: Vec<(&CacheKey, u64)> = tiles
                .iter()
                .rev()
                .map(|(key, tile)| (key, tile.last_used))
                .collect();
            candidates.sort_by_key(|(_, last_used)| *last_used);
            let victims: Vec<CacheKey> = candidates
                .into_iter()
                .take(excess)
                .map(|(key, _)| key.clone())
                .collect();

            for key in &victims {
                tiles.pop(key);
            }
            victims
        };

        for key in &victims {
            // Memory is already consistent; a failed delete is logged.
            let _ = self.delete_durable(key).await;
        }

        log::info!("Purged {} tiles to stay under quota", victims.len());
        victims
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("len", &self.len())
            .field("initialised", &self.is_initialised())
            .field("config", &self.config)
            .finish()
    }
}
