use serde::{Deserialize, Serialize};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Rounds `value` to `decimals` decimal places.
///
/// Viewport edges reported by a map surface jitter in the last few bits while
/// the user is not actually moving; rounding keeps the derived tile set stable.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Axis-aligned geographic bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn south_west(&self) -> LatLng {
        LatLng::new(self.min_lat, self.min_lon)
    }

    pub fn north_west(&self) -> LatLng {
        LatLng::new(self.max_lat, self.min_lon)
    }

    pub fn north_east(&self) -> LatLng {
        LatLng::new(self.max_lat, self.max_lon)
    }

    pub fn south_east(&self) -> LatLng {
        LatLng::new(self.min_lat, self.max_lon)
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Checks if the bounds contain a point (edges inclusive)
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lon
            && point.lng <= self.max_lon
    }

    /// Checks if the bounds are valid (min <= max on both axes, all finite)
    pub fn is_valid(&self) -> bool {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lon <= self.max_lon
            && self.min_lat <= self.max_lat
    }

    /// Returns a copy with every edge rounded to `decimals` decimal places
    pub fn rounded(&self, decimals: u32) -> GeoBounds {
        GeoBounds::new(
            round_to(self.min_lon, decimals),
            round_to(self.min_lat, decimals),
            round_to(self.max_lon, decimals),
            round_to(self.max_lat, decimals),
        )
    }
}
