//! Geospatial response cache.
//!
//! Payloads are stored per geohash cell and reused for any position inside
//! that cell while they are younger than the configured maximum age.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use chrono::Duration;
//! use geo_cache::{CacheConfig, GeoCache};
//! use weather_common::{Position, SystemClock};
//!
//! # tokio_test::block_on(async {
//! let cache = GeoCache::new(CacheConfig::new(Duration::minutes(30)), Arc::new(SystemClock)).unwrap();
//! let pos = Position::new(10.0, 20.0);
//! cache.put(&pos, Arc::new(serde_json::json!({"current": {}}))).await;
//! assert!(cache.lookup(&pos).await.is_some());
//! # });
//! ```

pub mod cache;
pub mod cell;
pub mod disk;
pub mod error;

pub use cache::{CacheConfig, CacheEntry, CacheStats, CacheStatsSnapshot, EntryRef, GeoCache};
pub use cell::{CellBounds, CellKey};
pub use error::{CacheError, CacheResult};
