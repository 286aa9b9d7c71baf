//! Open slides, cached by identifier.
//!
//! Parsing a slide costs a dozen range reads, so opened slides are kept in
//! an LRU together with their block-cached reader. Concurrent requests for a
//! slide that is still opening wait for the first open instead of repeating
//! it.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use crate::error::{FormatError, IoError, TiffError};
use crate::io::{BlockCache, RangeReader, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};

use super::reader::Slide;

/// Default number of open slides kept.
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 16;

/// Where slide bytes come from.
#[async_trait]
pub trait SlideSource: Send + Sync {
    type Reader: RangeReader + 'static;

    /// Open a reader for `slide_id`. Missing slides are `IoError::NotFound`.
    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError>;
}

/// A parsed slide with the reader its tiles are fetched through.
pub struct CachedSlide<R: RangeReader + 'static> {
    slide_id: String,
    slide: Slide,
    reader: Arc<BlockCache<R>>,
}

impl<R: RangeReader + 'static> CachedSlide<R> {
    pub fn slide_id(&self) -> &str {
        &self.slide_id
    }

    pub fn slide(&self) -> &Slide {
        &self.slide
    }

    pub fn reader(&self) -> &BlockCache<R> {
        &self.reader
    }

    /// Stored bytes of one tile.
    pub async fn read_raw_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        self.slide
            .read_raw_tile(self.reader.as_ref(), level, tile_x, tile_y)
            .await
    }
}

type OpenResult<R> = Result<Arc<CachedSlide<R>>, FormatError>;

struct InFlightOpen<R: RangeReader + 'static> {
    notify: Notify,
    result: Mutex<Option<OpenResult<R>>>,
}

/// LRU of open slides with single-flight opening.
pub struct SlideRegistry<S: SlideSource> {
    source: S,
    cache: RwLock<LruCache<String, Arc<CachedSlide<S::Reader>>>>,
    in_flight: Mutex<HashMap<String, Arc<InFlightOpen<S::Reader>>>>,
    block_size: usize,
    block_capacity: usize,
}

impl<S: SlideSource> SlideRegistry<S> {
    pub fn new(source: S) -> Self {
        Self::with_capacity(
            source,
            DEFAULT_SLIDE_CACHE_CAPACITY,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_BLOCK_CAPACITY,
        )
    }

    /// `slide_capacity` slides, each reading through `block_capacity` blocks
    /// of `block_size` bytes. Zero capacities are raised to one.
    pub fn with_capacity(
        source: S,
        slide_capacity: usize,
        block_size: usize,
        block_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(slide_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            block_size,
            block_capacity,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The open slide for `slide_id`, opening it on first use.
    ///
    /// Failed opens are not cached; the next call retries.
    pub async fn get_slide(&self, slide_id: &str) -> OpenResult<S::Reader> {
        if let Some(slide) = self.cache.write().await.get(slide_id) {
            return Ok(slide.clone());
        }

        let state = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(slide_id) {
                let existing = existing.clone();
                let notified = existing.notify.notified();
                drop(in_flight);
                notified.await;
                if let Some(result) = existing.result.lock().await.as_ref() {
                    return result.clone();
                }
                // The leader vanished without a result (its task was
                // cancelled); open on our own.
                return self.open_and_cache(slide_id).await;
            }

            // Another open may have finished between the cache check and
            // taking the lock.
            if let Some(slide) = self.cache.write().await.get(slide_id) {
                return Ok(slide.clone());
            }

            let state = Arc::new(InFlightOpen {
                notify: Notify::new(),
                result: Mutex::new(None),
            });
            in_flight.insert(slide_id.to_string(), state.clone());
            state
        };

        let result = self.open_and_cache(slide_id).await;
        *state.result.lock().await = Some(result.clone());
        self.in_flight.lock().await.remove(slide_id);
        state.notify.notify_waiters();

        result
    }

    async fn open_and_cache(&self, slide_id: &str) -> OpenResult<S::Reader> {
        let reader = self.source.create_reader(slide_id).await?;
        let reader = Arc::new(BlockCache::with_capacity(
            reader,
            self.block_size,
            self.block_capacity,
        ));
        let slide = Slide::open(reader.as_ref()).await?;
        debug!(slide_id, format = slide.format().name(), "slide cached");

        let cached = Arc::new(CachedSlide {
            slide_id: slide_id.to_string(),
            slide,
            reader,
        });
        self.cache
            .write()
            .await
            .put(slide_id.to_string(), cached.clone());
        Ok(cached)
    }

    /// Forget one slide; the next request reopens it.
    pub async fn invalidate(&self, slide_id: &str) {
        self.cache.write().await.pop(slide_id);
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
