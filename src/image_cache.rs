//! Image cache for fast scrolling and page turns.
//!
//! Caches decoded, resized surfaces keyed by page, mode, zoom and viewport
//! using an LRU policy. The cache is shared between the render thread and the
//! preload worker; every operation runs under one mutex so neither side can
//! observe a half-evicted or half-inserted state.

use crate::image_loader::LoadedImage;
use crate::state::Viewport;
use crate::view_mode::{ViewMode, Zoom};
use log::debug;
use lru::LruCache;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one decoded rendition of a page.
///
/// The zoom is already rounded to two decimals, so near-equal zooms share an
/// entry while distinct roundings are distinct keys. The viewport is part of
/// the key because every target size derives from it: a surface decoded for
/// one viewport can never be served for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    page: PathBuf,
    mode: ViewMode,
    zoom: Zoom,
    viewport: Viewport,
}

impl CacheKey {
    pub fn new(page: impl Into<PathBuf>, mode: ViewMode, zoom: Zoom, viewport: Viewport) -> Self {
        Self {
            page: page.into(),
            mode,
            zoom,
            viewport,
        }
    }

    pub fn page(&self) -> &Path {
        &self.page
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently resident
    pub resident: usize,
    /// Maximum number of resident entries
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Number of entries dropped by eviction passes
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState<S> {
    entries: LruCache<CacheKey, LoadedImage<S>>,
    capacity: usize,
    eviction_batch: usize,
    stats: CacheStats,
}

impl<S> CacheState<S> {
    /// Entries dropped per eviction pass.
    ///
    /// The configured batch, but never more than a third of the capacity: the
    /// most recent two thirds of a full cache always survive a pass.
    fn batch_size(&self) -> usize {
        self.eviction_batch.min((self.capacity / 3).max(1))
    }

    /// Pops the least recently used entries and hands them back to the caller.
    fn evict_batch(&mut self) -> Vec<LoadedImage<S>> {
        let count = self.batch_size().min(self.entries.len());
        let evicted: Vec<LoadedImage<S>> = (0..count)
            .filter_map(|_| self.entries.pop_lru().map(|(_, entry)| entry))
            .collect();
        self.stats.evictions += evicted.len() as u64;
        evicted
    }
}

/// Bounded LRU cache of decoded page surfaces.
pub struct ImageCache<S> {
    state: Mutex<CacheState<S>>,
}

/// The cache as shared between the render thread and the preload worker.
pub type SharedCache<S> = Arc<ImageCache<S>>;

impl<S: Clone> ImageCache<S> {
    /// Creates a new image cache holding at most `capacity` entries.
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                capacity,
                eviction_batch: eviction_batch.max(1),
                stats: CacheStats {
                    capacity,
                    ..Default::default()
                },
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retrieves an entry and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<LoadedImage<S>> {
        let mut state = self.lock();
        let result = state.entries.get(key).cloned();
        if result.is_some() {
            state.stats.hits += 1;
            debug!("Cache HIT: {} @{} {}", key.page.display(), key.zoom, key.mode);
        } else {
            state.stats.misses += 1;
            debug!("Cache MISS: {} @{} {}", key.page.display(), key.zoom, key.mode);
        }
        result
    }

    /// Checks residency without touching recency order or statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Stores an entry as the most recently used one.
    ///
    /// Inserting a new key into a full cache first drops a batch of the least
    /// recently used entries. Dropped surfaces are released after the lock is
    /// let go.
    pub fn put(&self, key: CacheKey, entry: LoadedImage<S>) {
        debug!(
            "Cache PUT: {} @{} {} ({}x{})",
            key.page.display(),
            key.zoom,
            key.mode,
            entry.width,
            entry.height
        );

        let evicted = {
            let mut state = self.lock();
            let evicted = if !state.entries.contains(&key) && state.entries.len() >= state.capacity
            {
                state.evict_batch()
            } else {
                Vec::new()
            };
            state.entries.put(key, entry);
            state.stats.resident = state.entries.len();
            evicted
        };

        if !evicted.is_empty() {
            debug!("Cache evicted {} entries", evicted.len());
        }
        drop(evicted);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.lock();
            let dropped: Vec<LoadedImage<S>> = std::iter::from_fn(|| state.entries.pop_lru())
                .map(|(_, entry)| entry)
                .collect();
            state.stats.resident = 0;
            dropped
        };
        debug!("Cache cleared ({} entries)", dropped.len());
    }

    /// Keeps only entries of `mode` whose zoom lies within `tolerance` of `zoom`.
    ///
    /// Survivors keep their relative recency order.
    pub fn clear_except_zoom(&self, zoom: Zoom, mode: ViewMode, tolerance: Zoom) {
        let dropped = {
            let mut state = self.lock();
            let stale: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(key, _)| key.mode != mode || key.zoom.distance(zoom) > tolerance)
                .map(|(key, _)| key.clone())
                .collect();
            let dropped: Vec<LoadedImage<S>> = stale
                .iter()
                .filter_map(|key| state.entries.pop(key))
                .collect();
            state.stats.resident = state.entries.len();
            dropped
        };
        debug!(
            "Cache kept {} zoom {}±{}, dropped {} entries",
            mode,
            zoom,
            tolerance,
            dropped.len()
        );
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Resident keys from least to most recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        let state = self.lock();
        let mut keys: Vec<CacheKey> = state.entries.iter().map(|(key, _)| key.clone()).collect();
        keys.reverse();
        keys
    }
}
