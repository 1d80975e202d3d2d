//! Core constants derived from the police.uk street-crime API and the grid the
//! viewer has always used. Keeping them in a single place makes it easier to
//! tweak engine-wide magic numbers.

/// Grid origin longitude in degrees.
pub const GRID_MIN_LON: f64 = -180.0;

/// Grid origin latitude in degrees.
pub const GRID_MIN_LAT: f64 = -90.0;

/// Tile width in degrees of longitude (≈ 5 miles at UK latitudes).
pub const GRID_TILE_WIDTH: f64 = 0.125;

/// Tile height in degrees of latitude (5 / 69 ≈ 0.072).
pub const GRID_TILE_HEIGHT: f64 = 0.072;

/// Decimal places viewport bounds are rounded to before tiling.
pub const COORDINATE_PRECISION: u32 = 6;

/// Maximum number of simultaneous outbound tile requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Total attempts per tile fetch, including the first one.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Base delay for linear retry backoff.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Estimated footprint of one cached tile record.
pub const BYTES_PER_RECORD_ESTIMATE: u64 = 8 * 1024;

/// Purge starts once the estimated footprint exceeds this share of the quota.
pub const PURGE_THRESHOLD: f64 = 0.9;

/// Purge evicts until the estimated footprint is at or below this share.
pub const PURGE_TARGET: f64 = 0.6;

/// Quota assumed when the environment cannot report one (50 MiB).
pub const FALLBACK_QUOTA_BYTES: u64 = 50 * 1024 * 1024;

/// Base URL of the public police data API.
pub const POLICE_API_BASE_URL: &str = "https://data.police.uk/api";

/// Months between today and the latest month the API usually publishes.
pub const PUBLICATION_LAG_MONTHS: u32 = 2;
