use super::cache::{CacheKey, TileCache};
use super::grid::{TileCoord, TileGrid};
use super::retry::retry;
use super::source::CrimeSource;
use crate::core::config::FetcherConfig;
use crate::core::date::DateKey;
use crate::core::geo::GeoBounds;
use crate::data::crime::{to_features, CrimeFeature};
use crate::prelude::{Arc, HashMap, HashSet, Mutex};
use crate::runtime::{self, TaskHandle};
use crate::{Result, TileError};
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::future::{join_all, AbortHandle, AbortRegistration, Abortable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::PoisonError;
use tokio::sync::Semaphore;

/// Receives batches of features as tiles become available. May be called any
/// number of times per cycle.
pub type FeatureCallback = Arc<dyn Fn(Vec<CrimeFeature>) + Send + Sync>;

/// What the map currently shows
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportRequest {
    pub bounds: GeoBounds,
    pub date_key: DateKey,
    pub categories: Vec<String>,
}

impl ViewportRequest {
    pub fn new(bounds: GeoBounds, date_key: DateKey, categories: Vec<String>) -> Self {
        Self {
            bounds,
            date_key,
            categories,
        }
    }

    /// Categories in request order, duplicates removed
    fn unique_categories(&self) -> Vec<&str> {
        let mut seen = HashSet::default();
        self.categories
            .iter()
            .map(String::as_str)
            .filter(|category| seen.insert(*category))
            .collect()
    }
}

/// Tally of one coordinator cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Tiles in view across all categories
    pub required: usize,
    /// Tiles replayed from the cache
    pub served_from_cache: usize,
    /// Tiles left to a fetch another cycle already started
    pub skipped_in_flight: usize,
    /// Fetches this cycle started that returned data
    pub fetched: usize,
    /// Fetches that succeeded with no records
    pub empty: usize,
    /// Fetches that failed after every retry
    pub failed: usize,
    /// Fetches cancelled before completing
    pub cancelled: usize,
    /// In-flight fetches of other cycles cancelled because they left the view
    pub cancelled_stale: usize,
    /// Tiles evicted by the end-of-cycle purge
    pub purged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileOutcome {
    Fetched,
    Empty,
    Failed,
    Cancelled,
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    abort: AbortHandle,
}

/// Coordinator state; every mutation happens in one lock scope and the lock is
/// never held across an await.
#[derive(Debug, Default)]
struct FetcherState {
    in_flight: HashMap<CacheKey, InFlight>,
    last_date_keys: HashMap<String, DateKey>,
    rendered: HashMap<CacheKey, Arc<Vec<CrimeFeature>>>,
}

impl FetcherState {
    fn clear_category(&mut self, category: &str) {
        self.rendered.retain(|key, _| key.category != category);
    }
}

/// Drives tile acquisition for a `(viewport, month, categories)` request.
///
/// Each call to [`ViewportFetcher::load_viewport`] is a cycle: it cancels
/// in-flight fetches that left the view, replays cached tiles, fetches the
/// missing ones through a global concurrency limit and finally asks the cache
/// to purge. A newer cycle never waits for an older one.
#[derive(Clone)]
pub struct ViewportFetcher {
    config: FetcherConfig,
    grid: TileGrid,
    cache: TileCache,
    source: Arc<dyn CrimeSource>,
    limiter: Arc<Semaphore>,
    state: Arc<Mutex<FetcherState>>,
    next_fetch_id: Arc<AtomicU64>,
}

impl ViewportFetcher {
    /// Create a fetcher over an initialised cache, see [`TileCache::open`]
    pub fn new(config: FetcherConfig, cache: TileCache, source: Arc<dyn CrimeSource>) -> Result<Self> {
        config.validate()?;
        if !cache.is_initialised() {
            return Err(TileError::Uninitialised);
        }
        let grid = TileGrid::with_precision(config.grid, config.coordinate_precision);
        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            grid,
            cache,
            source,
            state: Arc::new(Mutex::new(FetcherState::default())),
            next_fetch_id: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tiles covering the rounded viewport
    pub fn tiles_for(&self, bounds: &GeoBounds) -> Vec<TileCoord> {
        self.grid
            .tiles_in_bounds(&bounds.rounded(self.config.coordinate_precision))
    }

    /// Fire-and-forget variant of [`ViewportFetcher::load_viewport`]
    pub fn request_viewport_data<F>(&self, request: ViewportRequest, on_features: F) -> TaskHandle<CycleSummary>
    where
        F: Fn(Vec<CrimeFeature>) + Send + Sync + 'static,
    {
        let fetcher = self.clone();
        runtime::spawn(async move { fetcher.load_viewport(&request, on_features).await })
    }

    /// Runs a cycle in the background and yields its feature batches as a
    /// stream that ends when the cycle settles
    pub fn request_viewport_stream(
        &self,
        request: ViewportRequest,
    ) -> (TaskHandle<CycleSummary>, UnboundedReceiver<Vec<CrimeFeature>>) {
        let (tx, rx) = unbounded();
        let handle = self.request_viewport_data(request, move |features| {
            // The receiver may have been dropped; the cycle still completes.
            let _ = tx.unbounded_send(features);
        });
        (handle, rx)
    }

    /// Run one cycle to completion.
    ///
    /// Cached tiles are handed to `on_features` before any request for this
    /// cycle is issued. Individual tile failures never abort their siblings.
    pub async fn load_viewport<F>(&self, request: &ViewportRequest, on_features: F) -> CycleSummary
    where
        F: Fn(Vec<CrimeFeature>) + Send + Sync + 'static,
    {
        if !request.bounds.is_valid() {
            log::warn!("ignoring viewport with invalid bounds {:?}", request.bounds);
            return CycleSummary::default();
        }

        let on_features: FeatureCallback = Arc::new(on_features);
        let tiles = self.tiles_for(&request.bounds);
        let categories = request.unique_categories();

        let mut summary = CycleSummary {
            required: tiles.len() * categories.len(),
            ..CycleSummary::default()
        };
        let required: HashSet<CacheKey> = categories
            .iter()
            .flat_map(|category| {
                tiles
                    .iter()
                    .map(|tile| CacheKey::new(*category, request.date_key.clone(), *tile))
            })
            .collect();

        let mut hits = Vec::new();
        let mut scheduled = Vec::new();
        {
            let mut state = self.lock();

            state.in_flight.retain(|key, fetch| {
                if required.contains(key) {
                    return true;
                }
                log::debug!("cancelling tile {} (left the view)", key);
                fetch.abort.abort();
                summary.cancelled_stale += 1;
                false
            });

            for category in &categories {
                let previous = state
                    .last_date_keys
                    .insert(category.to_string(), request.date_key.clone());
                if self.config.clear_on_change
                    && previous.as_ref().is_some_and(|date| *date != request.date_key)
                {
                    log::debug!("month changed for {}, clearing rendered features", category);
                    state.clear_category(category);
                }

                for tile in &tiles {
                    let key = CacheKey::new(*category, request.date_key.clone(), *tile);

                    if let Some(payload) = self.cache.get(&key) {
                        self.cache.touch(&key);
                        state.rendered.insert(key, payload.clone());
                        hits.push(payload);
                        continue;
                    }

                    if state.in_flight.contains_key(&key) {
                        summary.skipped_in_flight += 1;
                        continue;
                    }

                    let (abort, registration) = AbortHandle::new_pair();
                    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    state.in_flight.insert(key.clone(), InFlight { id, abort });
                    scheduled.push((key, id, registration));
                }
            }
        }

        summary.served_from_cache = hits.len();
        for payload in hits {
            if !payload.is_empty() {
                on_features(payload.as_ref().clone());
            }
        }

        log::debug!(
            "cycle for {} in {} tile(s): {} cached, {} to fetch, {} already in flight",
            request.date_key,
            summary.required,
            summary.served_from_cache,
            scheduled.len(),
            summary.skipped_in_flight
        );

        let fetches = scheduled
            .into_iter()
            .map(|(key, id, registration)| self.fetch_tile(key, id, registration, on_features.clone()));
        for outcome in join_all(fetches).await {
            match outcome {
                TileOutcome::Fetched => summary.fetched += 1,
                TileOutcome::Empty => summary.empty += 1,
                TileOutcome::Failed => summary.failed += 1,
                TileOutcome::Cancelled => summary.cancelled += 1,
            }
        }

        summary.purged = self.cache.purge_if_needed().await.len();
        summary
    }

    async fn fetch_tile(
        &self,
        key: CacheKey,
        id: u64,
        registration: AbortRegistration,
        on_features: FeatureCallback,
    ) -> TileOutcome {
        let bounds = self.grid.bounds_for_tile(key.tile);
        let source = self.source.as_ref();
        let (category, date_key) = (key.category.as_str(), &key.date_key);
        let work = async {
            let _permit = self
                .limiter
                .acquire()
                .await
                .map_err(|_| TileError::Cancelled)?;
            log::debug!("fetching tile {}", key);
            let bounds = &bounds;
            retry(
                move || source.fetch(category, date_key, bounds),
                self.config.retry_attempts,
                self.config.retry_base_delay(),
            )
            .await
        };

        let result = match Abortable::new(work, registration).await {
            Ok(result) => result,
            Err(aborted) => Err(aborted.into()),
        };

        let outcome = match result {
            Ok(crimes) if crimes.is_empty() => TileOutcome::Empty,
            Ok(crimes) => {
                let features = to_features(&crimes);
                // A durable failure is logged by the cache; memory already has the tile.
                let _ = self.cache.mark_loaded(key.clone(), features.clone()).await;
                if self.record_rendered(&key, Arc::new(features.clone())) && !features.is_empty() {
                    on_features(features);
                }
                TileOutcome::Fetched
            }
            Err(e) if e.is_cancelled() => {
                log::debug!("Tile fetch aborted: {}", key);
                TileOutcome::Cancelled
            }
            Err(e) => {
                log::error!("Failed to fetch tile {}: {}", key, e);
                TileOutcome::Failed
            }
        };

        self.release_in_flight(&key, id);
        outcome
    }

    /// Adds a freshly fetched tile to the renderable set unless its month is
    /// no longer the one shown for its category
    fn record_rendered(&self, key: &CacheKey, payload: Arc<Vec<CrimeFeature>>) -> bool {
        let mut state = self.lock();
        let current = state
            .last_date_keys
            .get(&key.category)
            .map_or(true, |date| *date == key.date_key);
        if current {
            state.rendered.insert(key.clone(), payload);
        }
        current
    }

    fn release_in_flight(&self, key: &CacheKey, id: u64) {
        let mut state = self.lock();
        if state.in_flight.get(key).is_some_and(|fetch| fetch.id == id) {
            state.in_flight.remove(key);
        }
    }

    /// Cancel every in-flight fetch
    pub fn abort_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.in_flight.len();
        for (_, fetch) in state.in_flight.drain() {
            fetch.abort.abort();
        }
        if count > 0 {
            log::info!("aborted {} in-flight tile fetches", count);
        }
        count
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    /// Everything currently renderable, across categories
    pub fn rendered_features(&self) -> Vec<CrimeFeature> {
        let state = self.lock();
        let mut keys: Vec<&CacheKey> = state.rendered.keys().collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| state.rendered[key].iter().cloned())
            .collect()
    }

    /// Renderable features of one category
    pub fn rendered_features_for(&self, category: &str) -> Vec<CrimeFeature> {
        let state = self.lock();
        let mut keys: Vec<&CacheKey> = state
            .rendered
            .keys()
            .filter(|key| key.category == category)
            .collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| state.rendered[key].iter().cloned())
            .collect()
    }

    /// Drop a category from the renderable set, e.g. when it is toggled off
    pub fn clear_category(&self, category: &str) {
        let mut state = self.lock();
        state.clear_category(category);
        state.last_date_keys.remove(category);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TileCacheConfig;
    use crate::core::geo::LatLng;
    use crate::data::crime::{Crime, CrimeLocation};
    use crate::tiles::store::MemoryStore;
    use async_trait::async_trait;

    struct OneCrimePerTile;

    #[async_trait]
    impl CrimeSource for OneCrimePerTile {
        async fn fetch(&self, category: &str, date_key: &DateKey, bounds: &GeoBounds) -> Result<Vec<Crime>> {
            let center: LatLng = bounds.center();
            Ok(vec![Crime {
                category: category.to_string(),
                id: None,
                persistent_id: None,
                location_type: None,
                location: CrimeLocation {
                    latitude: center.lat.to_string(),
                    longitude: center.lng.to_string(),
                    street: None,
                },
                context: None,
                outcome_status: None,
                month: date_key.to_string(),
            }])
        }
    }

    async fn fetcher(clear_on_change: bool) -> ViewportFetcher {
        let cache = TileCache::open(Arc::new(MemoryStore::new()), None, TileCacheConfig::default())
            .await
            .unwrap();
        let config = FetcherConfig {
            clear_on_change,
            ..FetcherConfig::for_testing()
        };
        ViewportFetcher::new(config, cache, Arc::new(OneCrimePerTile)).unwrap()
    }

    fn request(date: &str, categories: &[&str]) -> ViewportRequest {
        ViewportRequest::new(
            GeoBounds::new(-0.13, 51.50, -0.12, 51.51),
            date.parse().unwrap(),
            categories.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_categories_are_collapsed() {
        let fetcher = fetcher(true).await;
        let summary = fetcher
            .load_viewport(&request("2024-05", &["burglary", "burglary"]), |_| {})
            .await;
        assert_eq!(summary.required, 2);
        assert_eq!(summary.fetched, 2);
    }

    #[tokio::test]
    async fn test_month_change_clears_only_that_category() {
        let fetcher = fetcher(true).await;
        fetcher
            .load_viewport(&request("2024-05", &["burglary", "robbery"]), |_| {})
            .await;
        assert_eq!(fetcher.rendered_features().len(), 4);

        fetcher
            .load_viewport(&request("2024-06", &["burglary"]), |_| {})
            .await;
        let burglary = fetcher.rendered_features_for("burglary");
        assert_eq!(burglary.len(), 2);
        assert!(burglary.iter().all(|f| f.month == "2024-06"));
        assert_eq!(fetcher.rendered_features_for("robbery").len(), 2);
    }

    #[tokio::test]
    async fn test_month_change_keeps_features_when_clearing_disabled() {
        let fetcher = fetcher(false).await;
        fetcher
            .load_viewport(&request("2024-05", &["burglary"]), |_| {})
            .await;
        fetcher
            .load_viewport(&request("2024-06", &["burglary"]), |_| {})
            .await;
        assert_eq!(fetcher.rendered_features_for("burglary").len(), 4);
    }

    #[tokio::test]
    async fn test_replays_do_not_duplicate_rendered_features() {
        let fetcher = fetcher(true).await;
        for _ in 0..3 {
            fetcher
                .load_viewport(&request("2024-05", &["burglary"]), |_| {})
                .await;
        }
        assert_eq!(fetcher.rendered_features().len(), 2);

        fetcher.clear_category("burglary");
        assert!(fetcher.rendered_features().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_bounds_schedule_nothing() {
        let fetcher = fetcher(true).await;
        let date: DateKey = "2024-05".parse().unwrap();
        let categories = vec!["burglary".to_string()];

        for bounds in [
            GeoBounds::new(f64::NEG_INFINITY, 51.5, f64::INFINITY, 51.5),
            GeoBounds::new(f64::NAN, 51.50, -0.12, 51.51),
            GeoBounds::new(-0.12, 51.50, -0.13, 51.51),
        ] {
            let request = ViewportRequest::new(bounds, date.clone(), categories.clone());
            let summary = fetcher.load_viewport(&request, |_| {}).await;
            assert_eq!(summary, CycleSummary::default());
        }
        assert!(fetcher.cache().is_empty());
        assert_eq!(fetcher.in_flight_count(), 0);
    }

    #[test]
    fn test_rejects_uninitialised_cache() {
        let cache = TileCache::new(Arc::new(MemoryStore::new()), None, TileCacheConfig::default());
        let result = ViewportFetcher::new(FetcherConfig::for_testing(), cache, Arc::new(OneCrimePerTile));
        assert!(matches!(result, Err(TileError::Uninitialised)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cache = TileCache::new(Arc::new(MemoryStore::new()), None, TileCacheConfig::default());
        let config = FetcherConfig {
            max_concurrent: 0,
            ..FetcherConfig::default()
        };
        assert!(ViewportFetcher::new(config, cache, Arc::new(OneCrimePerTile)).is_err());
    }
}
