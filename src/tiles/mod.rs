pub mod cache;
pub mod grid;
pub mod loader;
pub mod retry;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use cache::{CacheKey, TileCache};
pub use grid::{TileCoord, TileGrid};
pub use loader::{CycleSummary, ViewportFetcher, ViewportRequest};
pub use source::{CrimeSource, PoliceApiSource};
pub use store::{DurableStore, FileStore, MemoryStore};
