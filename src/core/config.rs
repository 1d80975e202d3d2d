//! Configuration for the tile grid, the cache and the viewport fetcher
//!
//! Every section can be built in code, taken from a preset, or deserialized
//! from JSON. Missing JSON fields fall back to the same defaults the presets use.

use crate::core::constants::*;
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Projection from geography to the fixed tile grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileGridConfig {
    pub min_lon: f64,
    pub min_lat: f64,
    pub tile_width: f64,
    pub tile_height: f64,
}

impl TileGridConfig {
    /// Creates a validated grid configuration
    pub fn new(min_lon: f64, min_lat: f64, tile_width: f64, tile_height: f64) -> Result<Self> {
        let config = Self {
            min_lon,
            min_lat,
            tile_width,
            tile_height,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_lon.is_finite() && self.min_lat.is_finite()) {
            return Err(TileError::InvalidConfig(
                "grid origin must be finite".to_string(),
            ));
        }
        if !(self.tile_width.is_finite() && self.tile_width > 0.0) {
            return Err(TileError::InvalidConfig(format!(
                "tile_width must be > 0, got {}",
                self.tile_width
            )));
        }
        if !(self.tile_height.is_finite() && self.tile_height > 0.0) {
            return Err(TileError::InvalidConfig(format!(
                "tile_height must be > 0, got {}",
                self.tile_height
            )));
        }
        Ok(())
    }
}

impl Default for TileGridConfig {
    fn default() -> Self {
        Self {
            min_lon: GRID_MIN_LON,
            min_lat: GRID_MIN_LAT,
            tile_width: GRID_TILE_WIDTH,
            tile_height: GRID_TILE_HEIGHT,
        }
    }
}

/// Size estimation and eviction policy of the tile cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    /// Estimated bytes per cached record
    pub bytes_per_record: u64,
    /// Share of available quota above which a purge starts
    pub purge_threshold: f64,
    /// Share of available quota a purge shrinks the cache down to
    pub purge_target: f64,
    /// Quota assumed when no quota provider is available
    pub fallback_quota_bytes: u64,
}

impl TileCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_record == 0 {
            return Err(TileError::InvalidConfig(
                "bytes_per_record must be > 0".to_string(),
            ));
        }
        let in_range = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;
        if !in_range(self.purge_threshold) || !in_range(self.purge_target) {
            return Err(TileError::InvalidConfig(
                "purge_threshold and purge_target must be in (0, 1]".to_string(),
            ));
        }
        if self.purge_target > self.purge_threshold {
            return Err(TileError::InvalidConfig(format!(
                "purge_target ({}) must not exceed purge_threshold ({})",
                self.purge_target, self.purge_threshold
            )));
        }
        Ok(())
    }
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            bytes_per_record: BYTES_PER_RECORD_ESTIMATE,
            purge_threshold: PURGE_THRESHOLD,
            purge_target: PURGE_TARGET,
            fallback_quota_bytes: FALLBACK_QUOTA_BYTES,
        }
    }
}

/// Behaviour of the viewport fetch coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub grid: TileGridConfig,
    /// Maximum concurrent outbound requests across all categories and tiles
    pub max_concurrent: usize,
    /// Total attempts per tile, including the first
    pub retry_attempts: u32,
    /// Linear backoff unit between attempts
    pub retry_base_delay_ms: u64,
    /// Decimal places viewport bounds are rounded to
    pub coordinate_precision: u32,
    /// Drop a category's rendered features when its month changes
    pub clear_on_change: bool,
}

impl FetcherConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.max_concurrent == 0 {
            return Err(TileError::InvalidConfig(
                "max_concurrent must be > 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(TileError::InvalidConfig(
                "retry_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Small, fast settings for tests: short backoff, low concurrency
    pub fn for_testing() -> Self {
        Self {
            max_concurrent: 4,
            retry_base_delay_ms: 10,
            ..Self::default()
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            grid: TileGridConfig::default(),
            max_concurrent: MAX_CONCURRENT_REQUESTS,
            retry_attempts: RETRY_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            coordinate_precision: COORDINATE_PRECISION,
            clear_on_change: true,
        }
    }
}

/// Top-level configuration for a crime tile session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrimeTilesConfig {
    pub cache: TileCacheConfig,
    pub fetcher: FetcherConfig,
    pub api_base_url: String,
}

impl CrimeTilesConfig {
    pub fn for_testing() -> Self {
        Self {
            fetcher: FetcherConfig::for_testing(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.fetcher.validate()?;
        if self.api_base_url.trim().is_empty() {
            return Err(TileError::InvalidConfig(
                "api_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CrimeTilesConfig {
    fn default() -> Self {
        Self {
            cache: TileCacheConfig::default(),
            fetcher: FetcherConfig::default(),
            api_base_url: POLICE_API_BASE_URL.to_string(),
        }
    }
}
