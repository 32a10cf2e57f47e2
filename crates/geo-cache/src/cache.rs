//! Area-keyed, age-bounded cache of provider payloads.
//!
//! ## Key Structure
//! Keys are geohash prefixes of the requested position (see [`crate::cell`]).
//! Any position inside a cached cell is served the cell's payload.
//!
//! ## Staleness
//! An entry satisfies a lookup only while `now - fetched_at < max_age`.
//! Stale entries are dropped lazily on lookup. The LRU bound only matters for
//! a vessel that crosses many cells within one max-age window.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use weather_common::{Clock, Payload, Position};

use crate::cell::{CellKey, DEFAULT_PRECISION, MAX_PRECISION, MIN_PRECISION};
use crate::disk::DiskStore;
use crate::error::{CacheError, CacheResult};

/// Default number of cells kept in memory.
pub const DEFAULT_CAPACITY: usize = 256;

/// Cache construction parameters. Fixed for the lifetime of the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries older than this never satisfy a lookup. Zero or negative
    /// disables reuse entirely.
    pub max_age: Duration,
    /// Geohash length of a cell.
    pub precision: usize,
    /// Maximum number of cells held in memory.
    pub capacity: usize,
    /// Directory for the best-effort on-disk copy, if any.
    pub persist_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            precision: DEFAULT_PRECISION,
            capacity: DEFAULT_CAPACITY,
            persist_dir: None,
        }
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }
}

/// One cached payload. Replaced wholesale, never mutated.
#[derive(Debug)]
pub struct CacheEntry {
    key: CellKey,
    payload: Payload,
    fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn key(&self) -> &CellKey {
        &self.key
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Handle to an entry returned by [`GeoCache::lookup`].
///
/// Holds a snapshot: a concurrent `put` for the same cell does not change what
/// this handle points to.
#[derive(Debug, Clone)]
pub struct EntryRef(Arc<CacheEntry>);

impl EntryRef {
    pub fn key(&self) -> &CellKey {
        self.0.key()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.0.fetched_at()
    }
}

/// Counters for the geospatial cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Entries dropped because they aged past `max_age`.
    pub expired: AtomicU64,
    /// Entries dropped to respect the capacity bound.
    pub evictions: AtomicU64,
    pub writes: AtomicU64,
    pub persist_failures: AtomicU64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            hit_rate_percent: self.hit_rate(),
        }
    }
}

/// Plain copy of [`CacheStats`] for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
    pub writes: u64,
    pub persist_failures: u64,
    pub hit_rate_percent: f64,
}

/// Position-keyed payload cache with a freshness bound.
pub struct GeoCache {
    entries: RwLock<LruCache<CellKey, Arc<CacheEntry>>>,
    precision: usize,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    disk: Option<DiskStore>,
    /// Orders writes to the same cell; taken under the entries lock.
    sequence: AtomicU64,
    stats: CacheStats,
}

impl GeoCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&config.precision) {
            return Err(CacheError::Config(format!(
                "precision {} outside {}..={}",
                config.precision, MIN_PRECISION, MAX_PRECISION
            )));
        }
        let capacity = NonZeroUsize::new(config.capacity)
            .ok_or_else(|| CacheError::Config("capacity must be greater than zero".into()))?;

        info!(
            precision = config.precision,
            capacity = config.capacity,
            max_age_secs = config.max_age.num_seconds(),
            persist_dir = ?config.persist_dir,
            "GeoCache initialized"
        );

        Ok(Self {
            entries: RwLock::new(LruCache::new(capacity)),
            precision: config.precision,
            max_age: config.max_age,
            clock,
            disk: config.persist_dir.map(DiskStore::new),
            sequence: AtomicU64::new(0),
            stats: CacheStats::default(),
        })
    }

    /// Create a cache and warm it from the persistence directory, if configured.
    pub async fn open(config: CacheConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let cache = Self::new(config, clock)?;
        cache.load_persisted().await;
        Ok(cache)
    }

    /// Load still-fresh entries written by a previous run.
    ///
    /// Files for a different precision or already past `max_age` are ignored.
    pub async fn load_persisted(&self) -> usize {
        let Some(disk) = &self.disk else {
            return 0;
        };

        let now = self.clock.now();
        let mut persisted: Vec<_> = disk
            .load_all()
            .await
            .into_iter()
            .filter(|p| p.key.precision() == self.precision)
            .filter(|p| is_fresh_at(p.fetched_at, now, self.max_age))
            .collect();
        // Oldest first so the newest end up most recently used.
        persisted.sort_by_key(|p| p.fetched_at);

        let count = persisted.len();
        let mut entries = self.entries.write().await;
        for p in persisted {
            let entry = CacheEntry {
                key: p.key.clone(),
                payload: Arc::new(p.payload),
                fetched_at: p.fetched_at,
            };
            entries.put(p.key, Arc::new(entry));
        }

        info!(count, path = %disk.dir().display(), "Loaded persisted cache entries");
        count
    }

    /// Cell key for `position` at this cache's precision.
    pub fn derive(&self, position: &Position) -> CellKey {
        CellKey::derive(position, self.precision)
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Find a fresh entry covering `position`.
    ///
    /// `None` means the cell is missing or stale; it is never an error.
    pub async fn lookup(&self, position: &Position) -> Option<EntryRef> {
        let key = self.derive(position);
        let now = self.clock.now();

        let mut entries = self.entries.write().await;
        let found = entries.get(&key).cloned();

        match found {
            Some(entry) if is_fresh_at(entry.fetched_at, now, self.max_age) => {
                drop(entries);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                counter!("weather_cache_hits_total").increment(1);
                debug!(cell = %key, fetched_at = %entry.fetched_at, "Cache hit");
                Some(EntryRef(entry))
            }
            Some(entry) => {
                entries.pop(&key);
                drop(entries);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                counter!("weather_cache_misses_total").increment(1);
                debug!(cell = %key, fetched_at = %entry.fetched_at, "Cache entry stale");
                None
            }
            None => {
                drop(entries);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                counter!("weather_cache_misses_total").increment(1);
                debug!(cell = %key, "Cache miss");
                None
            }
        }
    }

    /// Payload of a previously looked-up entry.
    pub fn get(&self, entry: &EntryRef) -> Payload {
        Arc::clone(&entry.0.payload)
    }

    /// Re-check an entry against the freshness bound without a new lookup.
    pub fn is_fresh(&self, entry: &EntryRef) -> bool {
        is_fresh_at(entry.fetched_at(), self.clock.now(), self.max_age)
    }

    /// Store `payload` for the cell containing `position`, replacing any
    /// previous entry for that cell.
    pub async fn put(&self, position: &Position, payload: Payload) -> EntryRef {
        let key = self.derive(position);
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            payload,
            fetched_at: self.clock.now(),
        });

        let (seq, displaced) = {
            let mut entries = self.entries.write().await;
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            (seq, entries.push(key.clone(), Arc::clone(&entry)))
        };
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        // `push` hands back either the replaced entry for this key or the
        // least recently used entry it had to evict.
        if let Some((old_key, _)) = displaced {
            if old_key != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(cell = %old_key, "Evicted cache entry to respect capacity");
                if let Some(disk) = &self.disk {
                    if let Err(e) = disk.remove(&old_key, seq).await {
                        debug!(cell = %old_key, error = %e, "Failed to remove evicted cache file");
                    }
                }
            }
        }

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(&key, seq, entry.fetched_at, &entry.payload).await {
                self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!(cell = %key, error = %e, "Failed to persist cache entry");
            }
        }

        debug!(cell = %key, "Cache entry stored");
        EntryRef(entry)
    }

    /// Number of cells currently held in memory, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

fn is_fresh_at(fetched_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    max_age > Duration::zero() && now - fetched_at < max_age
}
