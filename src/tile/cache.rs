//! Cache of decoded source tiles.
//!
//! Neighbouring sample requests overlap the same source tiles, and decoding
//! (JPEG 2000 in particular) dominates the cost of a sample. Decoded tiles are
//! kept in an LRU bounded by their total size in bytes.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use super::decoder::DecodedTile;

/// Default capacity: 256MB of decoded samples
pub const DEFAULT_TILE_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Bounds LRU bookkeeping when tiles are tiny
const MAX_ENTRIES: usize = 16_384;

/// Identifies one source tile of one level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedTileKey {
    pub slide_id: Arc<str>,
    pub level: usize,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl DecodedTileKey {
    pub fn new(slide_id: impl Into<Arc<str>>, level: usize, tile_x: u32, tile_y: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            tile_x,
            tile_y,
        }
    }
}

/// Size-bounded LRU of decoded tiles, shared between sampling tasks.
///
/// A tile larger than the whole capacity is inserted and evicted again
/// immediately, so it is decoded on every use.
pub struct DecodedTileCache {
    cache: RwLock<LruCache<DecodedTileKey, Arc<DecodedTile>>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl DecodedTileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_BYTES)
    }

    /// Cache holding at most `max_size` bytes of decoded samples.
    pub fn with_capacity(max_size: usize) -> Self {
        let entries = NonZeroUsize::new(MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &DecodedTileKey) -> Option<Arc<DecodedTile>> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    pub async fn contains(&self, key: &DecodedTileKey) -> bool {
        self.cache.read().await.contains(key)
    }

    /// Insert a tile, then evict least recently used tiles until the cache
    /// fits its capacity again.
    pub async fn put(&self, key: DecodedTileKey, tile: Arc<DecodedTile>) {
        let tile_size = tile.byte_size();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old.byte_size());
        }

        // Entry-count eviction by the LRU itself must be accounted too
        if let Some((evicted_key, evicted)) = cache.push(key, tile) {
            if !cache.contains(&evicted_key) {
                *current_size = current_size.saturating_sub(evicted.byte_size());
            }
        }
        *current_size += tile_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.byte_size());
                }
                None => break,
            }
        }
    }

    /// Drop every tile of one slide.
    pub async fn invalidate_slide(&self, slide_id: &str) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let keys: Vec<DecodedTileKey> = cache
            .iter()
            .filter(|(key, _)| &*key.slide_id == slide_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(tile) = cache.pop(&key) {
                *current_size = current_size.saturating_sub(tile.byte_size());
            }
        }
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Bytes currently held.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for DecodedTileCache {
    fn default() -> Self {
        Self::new()
    }
}
