//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use crime_tiles::data::crime::CrimeLocation;
use crime_tiles::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// One crime at the tile center
    OneCrime,
    Empty,
    Unavailable,
}

/// Scriptable stand-in for the remote API.
///
/// Every call is recorded by the tile it covers. When gated, calls block until
/// [`FakeSource::open_gate`] is called.
pub struct FakeSource {
    grid: TileGrid,
    reply: Reply,
    gate: Option<Semaphore>,
    delay: Duration,
    started: Mutex<Vec<TileCoord>>,
    started_notify: Notify,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSource {
    pub fn new(reply: Reply) -> Self {
        Self {
            grid: TileGrid::default(),
            reply,
            gate: None,
            delay: Duration::ZERO,
            started: Mutex::new(Vec::new()),
            started_notify: Notify::new(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn calls_for(&self, tile: TileCoord) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == tile)
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.started_notify.notified();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl CrimeSource for FakeSource {
    async fn fetch(&self, category: &str, date_key: &DateKey, bounds: &GeoBounds) -> Result<Vec<Crime>> {
        let center = bounds.center();
        let tile = self.grid.tile_for_point(center.lng, center.lat);
        self.started.lock().unwrap().push(tile);
        self.started_notify.notify_waiters();

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.reply {
            Reply::OneCrime => Ok(vec![crime_at(category, date_key, center)]),
            Reply::Empty => Ok(Vec::new()),
            Reply::Unavailable => Err(TileError::Http {
                status: 503,
                url: format!("fake://{}/{}", category, tile),
            }),
        }
    }
}

pub fn crime_at(category: &str, date_key: &DateKey, point: LatLng) -> Crime {
    Crime {
        category: category.to_string(),
        id: None,
        persistent_id: None,
        location_type: Some("Force".to_string()),
        location: CrimeLocation {
            latitude: point.lat.to_string(),
            longitude: point.lng.to_string(),
            street: None,
        },
        context: None,
        outcome_status: None,
        month: date_key.to_string(),
    }
}

pub fn feature(category: &str, month: &str, context: &str) -> CrimeFeature {
    CrimeFeature {
        category: category.to_string(),
        outcome: "Unknown".to_string(),
        outcome_key: "unknown".to_string(),
        month: month.to_string(),
        location: LatLng::new(51.5, -0.12),
        street_name: None,
        context: Some(context.to_string()),
    }
}

pub async fn memory_cache() -> TileCache {
    TileCache::open(Arc::new(MemoryStore::new()), None, TileCacheConfig::default())
        .await
        .unwrap()
}

pub fn fetcher(source: &Arc<FakeSource>, cache: TileCache) -> ViewportFetcher {
    fetcher_with(source, cache, FetcherConfig::for_testing())
}

pub fn fetcher_with(source: &Arc<FakeSource>, cache: TileCache, config: FetcherConfig) -> ViewportFetcher {
    let source: Arc<dyn CrimeSource> = source.clone();
    ViewportFetcher::new(config, cache, source).unwrap()
}

/// Central London, covering tiles (1438, 1965) and (1439, 1965)
pub fn london() -> GeoBounds {
    GeoBounds::new(-0.13, 51.50, -0.12, 51.51)
}

/// Bounds from the center of `from` to the center of `to`, so exactly the
/// tiles in between are in view
pub fn span(from: TileCoord, to: TileCoord) -> GeoBounds {
    let grid = TileGrid::default();
    let (south_west, north_east) = (grid.tile_center(from), grid.tile_center(to));
    GeoBounds::new(south_west.lng, south_west.lat, north_east.lng, north_east.lat)
}

pub fn request(bounds: GeoBounds, date: &str, categories: &[&str]) -> ViewportRequest {
    ViewportRequest::new(
        bounds,
        date.parse().unwrap(),
        categories.iter().map(|c| c.to_string()).collect(),
    )
}

pub fn tile_key(category: &str, date: &str, tile: TileCoord) -> CacheKey {
    CacheKey::new(category, date.parse().unwrap(), tile)
}
