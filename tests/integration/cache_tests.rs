//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - The block cache turns many small reads into few large ones
//! - Decoded tiles are reused across overlapping requests
//! - Concurrent requests for one slide open it once
//! - Invalidation and clearing force fresh reads

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tiff_sampler::io::{BlockCache, RangeReader};
use tiff_sampler::slide::SlideRegistry;
use tiff_sampler::tile::{SampleRequest, SamplerOptions, TileSampler};

use super::test_utils::{pixel, MockSlideSource, PyramidTiffBuilder, TrackingMockReader};

fn request(x: u64, y: u64) -> SampleRequest {
    SampleRequest::new("slide.svs", x, y, 256, 20)
}

fn source() -> MockSlideSource {
    MockSlideSource::new().with_slide("slide.svs", PyramidTiffBuilder::new().build())
}

// =============================================================================
// Block Cache
// =============================================================================

#[tokio::test]
async fn test_block_cache_reduces_reads() {
    let inner = TrackingMockReader::new(vec![7u8; 64 * 1024], "mock://blocks");
    let cache = BlockCache::with_capacity(inner.clone(), 4096, 8);

    // Ten small reads inside block 0
    for i in 0..10u64 {
        let bytes = cache.read_exact_at(i * 100, 50).await.unwrap();
        assert_eq!(bytes.len(), 50);
    }
    assert_eq!(inner.request_count(), 1);
    assert_eq!(inner.get_requests().await, vec![(0, 4096)]);

    // A read across blocks 0 and 1 only fetches block 1
    let bytes = cache.read_exact_at(4000, 200).await.unwrap();
    assert_eq!(bytes.len(), 200);
    assert_eq!(inner.request_count(), 2);

    cache.read_exact_at(8200, 10).await.unwrap();
    assert_eq!(inner.request_count(), 3);
    assert_eq!(cache.cached_blocks().await, 3);
}

#[tokio::test]
async fn test_block_cache_capacity_evicts() {
    let inner = TrackingMockReader::new(vec![1u8; 64 * 1024], "mock://blocks");
    let cache = BlockCache::with_capacity(inner.clone(), 4096, 2);

    for block in 0..4u64 {
        cache.read_exact_at(block * 4096, 16).await.unwrap();
    }
    assert_eq!(cache.cached_blocks().await, 2);

    // Block 0 was evicted and is fetched again; block 3 is still cached
    cache.read_exact_at(0, 16).await.unwrap();
    cache.read_exact_at(3 * 4096, 16).await.unwrap();
    assert_eq!(inner.request_count(), 5);
}

// =============================================================================
// Decoded Tile Cache
// =============================================================================

#[tokio::test]
async fn test_repeated_sample_reads_nothing() {
    let source = source();
    let reads = source.read_counter();
    let sampler = TileSampler::new(source);

    let first = sampler.sample(&request(1000, 400)).await.unwrap();
    let after_first = reads.load(Ordering::SeqCst);
    assert!(after_first > 0);

    let second = sampler.sample(&request(1000, 400)).await.unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), after_first);
    assert_eq!(first, second);

    // Level 1 tiles 3..=5 by 1..=3
    let (_, _, entries) = sampler.cache_stats().await;
    assert_eq!(entries, 9);
}

#[tokio::test]
async fn test_overlapping_requests_share_tiles() {
    let sampler = TileSampler::new(source());

    sampler.sample(&request(1000, 400)).await.unwrap();
    assert_eq!(sampler.tile_cache().len().await, 9);

    // One source tile column to the right: three new tiles
    let shifted = sampler.sample(&request(1256, 400)).await.unwrap();
    assert_eq!(sampler.tile_cache().len().await, 12);
    assert_eq!(shifted.pixel(0, 0), pixel(1, 628, 200));
}

#[tokio::test]
async fn test_block_cache_serves_after_tile_cache_clear() {
    let source = source();
    let reads = source.read_counter();
    let sampler = TileSampler::new(source);

    let first = sampler.sample(&request(1000, 400)).await.unwrap();
    let after_first = reads.load(Ordering::SeqCst);

    sampler.tile_cache().clear().await;
    assert!(sampler.tile_cache().is_empty().await);

    // Decoding again, but the tile bytes are still in cached blocks
    let again = sampler.sample(&request(1000, 400)).await.unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), after_first);
    assert_eq!(again, first);
}

#[tokio::test]
async fn test_tile_cache_respects_byte_budget() {
    let options = SamplerOptions {
        // Two decoded 128x128 RGB tiles
        tile_cache_bytes: 2 * 128 * 128 * 3,
        ..SamplerOptions::default()
    };
    let sampler = TileSampler::with_options(source(), options);

    let tile = sampler.sample(&request(1000, 400)).await.unwrap();
    assert_eq!(tile.pixel(255, 255), pixel(1, 755, 455));

    let (size, capacity, entries) = sampler.cache_stats().await;
    assert!(size <= capacity);
    assert!(entries <= 2);
}

// =============================================================================
// Slide Registry
// =============================================================================

#[tokio::test]
async fn test_concurrent_opens_are_single_flight() {
    let source = source().with_open_delay(Duration::from_millis(50));
    let registry = Arc::new(SlideRegistry::new(source));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.get_slide("slide.svs").await.map(|slide| slide.slide().level_count())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }

    assert_eq!(registry.source().open_count("slide.svs").await, 1);
    assert_eq!(registry.cached_count().await, 1);
}

#[tokio::test]
async fn test_sample_many_opens_slide_once() {
    let source = source().with_open_delay(Duration::from_millis(20));
    let opens = source.open_counter();
    let sampler = Arc::new(TileSampler::new(source));

    let requests = (0..16).map(|i| request(i * 100, 0)).collect();
    let results = sampler.sample_many(requests).await;
    assert!(results.iter().all(|result| result.is_ok()));

    assert_eq!(opens.read().await.get("slide.svs").copied(), Some(1));
}

#[tokio::test]
async fn test_failed_open_is_not_cached() {
    let sampler = TileSampler::new(source());

    for _ in 0..2 {
        let err = sampler
            .sample(&SampleRequest::new("missing.svs", 0, 0, 256, 20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.svs"));
    }

    let registry = sampler.registry();
    assert_eq!(registry.source().open_count("missing.svs").await, 2);
    assert_eq!(registry.cached_count().await, 0);
}

#[tokio::test]
async fn test_invalidate_slide_reopens() {
    let sampler = TileSampler::new(source());
    let registry = Arc::clone(sampler.registry());

    sampler.sample(&request(0, 0)).await.unwrap();
    let reads = registry.source().read_count();
    sampler.invalidate_slide("slide.svs").await;
    assert!(sampler.tile_cache().is_empty().await);

    sampler.sample(&request(0, 0)).await.unwrap();
    assert_eq!(registry.source().open_count("slide.svs").await, 2);
    assert!(registry.source().read_count() > reads);
}

#[tokio::test]
async fn test_clear_caches() {
    let sampler = TileSampler::new(source());
    sampler.sample(&request(0, 0)).await.unwrap();
    assert_eq!(sampler.registry().cached_count().await, 1);

    sampler.clear_caches().await;
    assert_eq!(sampler.registry().cached_count().await, 0);
    let (size, _, entries) = sampler.cache_stats().await;
    assert_eq!((size, entries), (0, 0));
}
