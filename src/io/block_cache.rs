use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Default block size: 256KB.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default number of cached blocks per slide (64 * 256KB = 16MB).
pub const DEFAULT_BLOCK_CAPACITY: usize = 64;

/// Fixed-size block cache in front of a [`RangeReader`].
///
/// Opening a slide walks the IFD chain with many small reads at scattered
/// offsets, and neighbouring tiles of one sample usually share blocks. Reads
/// are rounded to aligned blocks which are kept in an LRU. Concurrent misses
/// on the same block are coalesced into a single fetch.
pub struct BlockCache<R> {
    inner: Arc<R>,
    block_size: usize,
    blocks: RwLock<LruCache<u64, Bytes>>,
    in_flight: Mutex<HashMap<u64, Arc<Notify>>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CAPACITY)
    }

    /// Wrap `inner` with `capacity` blocks of `block_size` bytes.
    ///
    /// Zero values are raised to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            blocks: RwLock::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently held.
    pub async fn cached_blocks(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Drop every cached block.
    pub async fn clear(&self) {
        self.blocks.write().await.clear();
    }

    async fn block(&self, index: u64) -> Result<Bytes, IoError> {
        loop {
            if let Some(data) = self.blocks.read().await.peek(&index) {
                return Ok(data.clone());
            }

            let notify = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(existing) = in_flight.get(&index) {
                    // Register before releasing the lock so a wakeup sent
                    // between the unlock and the await is not lost.
                    let existing = existing.clone();
                    let notified = existing.notified();
                    drop(in_flight);
                    notified.await;
                    continue;
                }
                let notify = Arc::new(Notify::new());
                in_flight.insert(index, notify.clone());
                notify
            };

            let result = self.fetch(index).await;

            {
                let mut blocks = self.blocks.write().await;
                let mut in_flight = self.in_flight.lock().await;
                if let Ok(data) = &result {
                    blocks.put(index, data.clone());
                }
                in_flight.remove(&index);
            }
            notify.notify_waiters();

            return result;
        }
    }

    async fn fetch(&self, index: u64) -> Result<Bytes, IoError> {
        let offset = index * self.block_size as u64;
        let size = self.inner.size();
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }
        let len = remaining.min(self.block_size as u64) as usize;
        self.inner.read_exact_at(offset, len).await
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let first = offset / block_size;
        let last = (offset + len as u64 - 1) / block_size;

        if first == last {
            let block = self.block(first).await?;
            let start = (offset % block_size) as usize;
            return Ok(block.slice(start..start + len));
        }

        let mut out = BytesMut::with_capacity(len);
        let mut position = offset;
        for index in first..=last {
            let block = self.block(index).await?;
            let start = (position % block_size) as usize;
            let take = (block.len() - start).min(len - out.len());
            out.extend_from_slice(&block[start..start + take]);
            position += take as u64;
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
