//! Prelude module for common crime-tiles types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use crime_tiles::prelude::*;`

pub use crate::core::{
    config::{CrimeTilesConfig, FetcherConfig, TileCacheConfig, TileGridConfig},
    date::DateKey,
    geo::{GeoBounds, LatLng},
};

pub use crate::data::crime::{Crime, CrimeFeature};

pub use crate::runtime::{async_delay, spawn, AsyncHandle, TaskHandle};

pub use crate::tiles::{
    cache::{CacheKey, TileCache},
    grid::{TileCoord, TileGrid},
    loader::{CycleSummary, ViewportFetcher, ViewportRequest},
    retry::retry,
    source::{CrimeSource, PoliceApiSource},
    store::{DurableStore, FileStore, FixedQuota, MemoryStore, QuotaProvider, TileRecord},
};

pub use crate::{Result, TileError};

pub use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use futures::Future;
