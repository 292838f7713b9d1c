//! Bounded LRU cache of read batches
//!
//! Keys are exact `(file, identity, start..end)` ranges, so only a repeat of
//! the very same read hits. Overlapping ranges are never merged.

use super::reader::ReadBatch;
use crate::types::FileIdentity;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies one read of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub identity: Option<FileIdentity>,
    pub start: u64,
    /// File length observed before the read
    pub end: u64,
}

/// Cache hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ResultCache {
    entries: LruCache<CacheKey, Arc<ReadBatch>>,
    stats: CacheStats,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("capacity", &self.entries.cap())
            .field("len", &self.entries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl ResultCache {
    /// Create a cache holding at most `capacity` batches (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Look up a batch, marking it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<ReadBatch>> {
        match self.entries.get(key) {
            Some(batch) => {
                self.stats.hits += 1;
                Some(Arc::clone(batch))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a batch, evicting the least recently used entry when full.
    pub fn put(&mut self, key: CacheKey, batch: Arc<ReadBatch>) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), batch) {
            if evicted != key {
                self.stats.evictions += 1;
                tracing::trace!(path = %evicted.path.display(), start = evicted.start, "Evicted cached batch");
            }
        }
    }

    /// Drop every entry for `path`.
    pub fn invalidate(&mut self, path: &Path) {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(k, _)| k.path == path)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            self.entries.pop(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
