//! # crime-tiles
//!
//! A viewport-driven, tiled fetch cache for street-level crime data.
//!
//! The map surface reports what the user is looking at; this crate turns that
//! continuously changing viewport into a bounded set of polygon queries against
//! a rate-limited remote API, caches the results durably, evicts under storage
//! pressure, deduplicates in-flight work and rides out transient failures.

pub mod core;
pub mod data;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::{CrimeTilesConfig, FetcherConfig, TileCacheConfig, TileGridConfig},
    date::DateKey,
    geo::{GeoBounds, LatLng},
};

pub use data::crime::{Crime, CrimeFeature};

pub use tiles::{
    cache::{CacheKey, TileCache},
    grid::{TileCoord, TileGrid},
    loader::{CycleSummary, ViewportFetcher, ViewportRequest},
    retry::retry,
    source::{CrimeSource, PoliceApiSource},
    store::{DurableStore, FileStore, MemoryStore, QuotaProvider, TileRecord},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error - status: {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date key: {0}")]
    InvalidDateKey(String),

    #[error("Tile cache used before it was initialised from its durable store")]
    Uninitialised,

    #[error("Request cancelled")]
    Cancelled,
}

impl TileError {
    /// Cancellation is an outcome, not a failure; it is never retried.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TileError::Cancelled)
    }
}

impl From<futures::future::Aborted> for TileError {
    fn from(_: futures::future::Aborted) -> Self {
        TileError::Cancelled
    }
}

/// Error type alias for convenience
pub type Error = TileError;

/// Initialise `env_logger` from `RUST_LOG`; safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
