//! Download cache with LRU eviction
//!
//! Keeps reconstructed files in memory so repeated downloads skip the
//! bucket. Entries are handed out as `Arc`s: the cache owns the bytes and
//! callers share them.
//!
//! # Thread Safety
//!
//! The LRU list sits behind a single mutex so a lookup and its promotion to
//! most-recently-used happen together.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::types::{ReconstructedFile, DEFAULT_CACHE_CAPACITY};

/// Bounded cache of downloaded files, keyed by file name
pub struct FileCache {
    entries: Mutex<LruCache<String, Arc<ReconstructedFile>>>,
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl FileCache {
    /// Create a cache holding at most `capacity` files (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a file and mark it most recently used
    pub fn get(&self, name: &str) -> Option<Arc<ReconstructedFile>> {
        self.entries.lock().get(name).cloned()
    }

    /// Check presence without touching the access order
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains(name)
    }

    /// Insert a file, evicting the least recently used one if full
    pub fn set(&self, name: impl Into<String>, file: ReconstructedFile) -> Arc<ReconstructedFile> {
        let name = name.into();
        let file = Arc::new(file);

        let evicted = self.entries.lock().push(name.clone(), file.clone());
        if let Some((evicted_name, _)) = evicted {
            if evicted_name != name {
                tracing::debug!(file_name = %evicted_name, "Evicted file from download cache");
            }
        }

        file
    }

    /// Remove one file. Returns whether it was cached.
    pub fn delete(&self, name: &str) -> bool {
        self.entries.lock().pop(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::debug!("Cleared download cache");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            size: entries.len(),
            max_size: entries.cap().get(),
        }
    }
}

/// Cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Files currently cached
    pub size: usize,
    /// Capacity
    pub max_size: usize,
}
