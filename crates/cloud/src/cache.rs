//! LRU cache of decoded blocks, shared across scene reads.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

/// Blocks kept by [`TileCache::default`]
pub const DEFAULT_CAPACITY: usize = 64;

/// Key for a cached block: the asset it came from and its linear index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub asset: String,
    pub block: usize,
}

impl TileKey {
    pub fn new(asset: impl Into<String>, block: usize) -> Self {
        Self {
            asset: asset.into(),
            block,
        }
    }
}

/// LRU cache of decoded block samples.
pub struct TileCache {
    inner: LruCache<TileKey, Arc<Vec<f64>>>,
}

impl TileCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &TileKey) -> Option<Arc<Vec<f64>>> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: TileKey, block: Arc<Vec<f64>>) {
        self.inner.put(key, block);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
