use crate::core::constants::POLICE_API_BASE_URL;
use crate::core::date::DateKey;
use crate::core::geo::GeoBounds;
use crate::data::crime::Crime;
use crate::{Result, TileError};
use async_trait::async_trait;
use geo_types::{coord, LineString};
use once_cell::sync::Lazy;

/// Shared async HTTP client; building it once avoids TLS and connection pool
/// setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("crime-tiles/", env!("CARGO_PKG_VERSION")))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Anything that can answer "which crimes of this category happened inside
/// this box during this month".
#[async_trait]
pub trait CrimeSource: Send + Sync {
    async fn fetch(&self, category: &str, date_key: &DateKey, bounds: &GeoBounds)
        -> Result<Vec<Crime>>;
}

/// Closed, clockwise ring around `bounds`: SW → NW → NE → SE → SW.
/// Coordinates are `x = lon`, `y = lat`.
pub fn polygon_for_bounds(bounds: &GeoBounds) -> LineString<f64> {
    let south_west = bounds.south_west();
    [
        south_west,
        bounds.north_west(),
        bounds.north_east(),
        bounds.south_east(),
        south_west,
    ]
    .into_iter()
    .map(|corner| coord! { x: corner.lng, y: corner.lat })
    .collect()
}

/// Formats a ring as the API's `poly` parameter: `lat,lon:lat,lon:...`
pub fn poly_param(ring: &LineString<f64>) -> String {
    ring.coords()
        .map(|c| format!("{},{}", c.y, c.x))
        .collect::<Vec<_>>()
        .join(":")
}

/// The public data.police.uk street-level crime endpoint
#[derive(Debug, Clone)]
pub struct PoliceApiSource {
    base_url: String,
}

impl PoliceApiSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Request URL for one tile
    pub fn url(&self, category: &str, date_key: &DateKey, bounds: &GeoBounds) -> String {
        format!(
            "{}/crimes-street/{}?poly={}&date={}",
            self.base_url,
            category,
            poly_param(&polygon_for_bounds(bounds)),
            date_key
        )
    }
}

impl Default for PoliceApiSource {
    fn default() -> Self {
        Self::new(POLICE_API_BASE_URL)
    }
}

#[async_trait]
impl CrimeSource for PoliceApiSource {
    async fn fetch(
        &self,
        category: &str,
        date_key: &DateKey,
        bounds: &GeoBounds,
    ) -> Result<Vec<Crime>> {
        let url = self.url(category, date_key, bounds);
        log::debug!("Fetching crimes from URL: {}", url);

        let response = HTTP_CLIENT.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TileError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let crimes: Vec<Crime> = serde_json::from_slice(&body)?;
        Ok(crimes)
    }
}
