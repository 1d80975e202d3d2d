use crate::core::config::TileGridConfig;
use crate::core::constants::COORDINATE_PRECISION;
use crate::core::geo::{round_to, GeoBounds, LatLng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer cell of the fixed degree grid. Coordinates may be negative for
/// geography west/south of the grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Durable-store tile key, `"{x}:{y}"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.x, self.y)
    }

    /// Parses a key produced by [`TileCoord::key`]
    pub fn from_key(key: &str) -> Option<Self> {
        let (x, y) = key.split_once(':')?;
        Some(Self::new(x.parse().ok()?, y.parse().ok()?))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Stateless mapping between geography and tile coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    config: TileGridConfig,
    precision: u32,
}

impl TileGrid {
    /// Creates a grid rounding inputs to the default coordinate precision
    pub fn new(config: TileGridConfig) -> Self {
        Self::with_precision(config, COORDINATE_PRECISION)
    }

    pub fn with_precision(config: TileGridConfig, precision: u32) -> Self {
        Self { config, precision }
    }

    pub fn config(&self) -> &TileGridConfig {
        &self.config
    }

    fn lon_to_tile_x(&self, lon: f64) -> i64 {
        let lon = round_to(lon, self.precision);
        ((lon - self.config.min_lon) / self.config.tile_width).floor() as i64
    }

    fn lat_to_tile_y(&self, lat: f64) -> i64 {
        let lat = round_to(lat, self.precision);
        ((lat - self.config.min_lat) / self.config.tile_height).floor() as i64
    }

    /// Tile containing the point. No range checks are applied.
    pub fn tile_for_point(&self, lon: f64, lat: f64) -> TileCoord {
        TileCoord::new(self.lon_to_tile_x(lon), self.lat_to_tile_y(lat))
    }

    /// Every tile whose box intersects `bounds`, ordered by x then y.
    ///
    /// Inverted or non-finite bounds yield an empty list, as does a span too
    /// wide to count.
    pub fn tiles_in_bounds(&self, bounds: &GeoBounds) -> Vec<TileCoord> {
        if !bounds.is_valid() {
            return Vec::new();
        }

        let start_x = self.lon_to_tile_x(bounds.min_lon);
        let end_x = self.lon_to_tile_x(bounds.max_lon);
        let start_y = self.lat_to_tile_y(bounds.min_lat);
        let end_y = self.lat_to_tile_y(bounds.max_lat);

        let span = |start: i64, end: i64| {
            end.checked_sub(start)
                .and_then(|d| d.checked_add(1))
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
        };
        let (Some(width), Some(height)) = (span(start_x, end_x), span(start_y, end_y)) else {
            return Vec::new();
        };
        let Some(count) = width.checked_mul(height) else {
            return Vec::new();
        };

        let mut tiles = Vec::with_capacity(count);
        for x in start_x..=end_x {
            for y in start_y..=end_y {
                tiles.push(TileCoord::new(x, y));
            }
        }
        tiles
    }

    /// Geographic box covered by a tile
    pub fn bounds_for_tile(&self, tile: TileCoord) -> GeoBounds {
        let c = &self.config;
        GeoBounds::new(
            c.min_lon + tile.x as f64 * c.tile_width,
            c.min_lat + tile.y as f64 * c.tile_height,
            c.min_lon + (tile.x + 1) as f64 * c.tile_width,
            c.min_lat + (tile.y + 1) as f64 * c.tile_height,
        )
    }

    /// Center of a tile
    pub fn tile_center(&self, tile: TileCoord) -> LatLng {
        self.bounds_for_tile(tile).center()
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new(TileGridConfig::default())
    }
}
