//! The tile sampler: request in, stitched tile out.
//!
//! ```text
//!   SampleRequest
//!        │
//!        ▼
//!   SlideRegistry ──► Slide (levels, AppMag)
//!        │
//!        ▼
//!   SamplePlan ──► source tiles ──► DecodedTileCache / TileDecoder
//!        │                                  │
//!        └──────────────► stitch ◄──────────┘
//!                           │
//!                           ▼
//!                         Tile
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SampleError;
use crate::format::tiff::DEFAULT_DOWNSAMPLE_TOLERANCE;
use crate::format::SlideFormat;
use crate::io::{RangeReader, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::slide::{
    CachedSlide, LevelInfo, SlideRegistry, SlideSource, DEFAULT_SLIDE_CACHE_CAPACITY,
};

use super::buffer::Tile;
use super::cache::{DecodedTileCache, DecodedTileKey, DEFAULT_TILE_CACHE_BYTES};
use super::decoder::{DecodedTile, LevelCoding, TileDecoder};
use super::plan::{SamplePlan, SampleRequest};
use super::stitch::{stitch, DEFAULT_PAD_VALUE};

// =============================================================================
// Options
// =============================================================================

/// Tuning of a [`TileSampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    /// How far a level's downsample may be from the target and still match
    pub tolerance: f64,

    /// Byte written where the region has no source pixels
    pub pad_value: u8,

    /// Base magnification for slides without AppMag
    pub fallback_magnification: Option<f64>,

    pub slide_cache_capacity: usize,
    pub tile_cache_bytes: usize,
    pub block_size: usize,
    pub block_capacity: usize,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DOWNSAMPLE_TOLERANCE,
            pad_value: DEFAULT_PAD_VALUE,
            fallback_magnification: None,
            slide_cache_capacity: DEFAULT_SLIDE_CACHE_CAPACITY,
            tile_cache_bytes: DEFAULT_TILE_CACHE_BYTES,
            block_size: DEFAULT_BLOCK_SIZE,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl SamplerOptions {
    /// Defaults overridden by `TIFF_SAMPLER_*` environment variables.
    ///
    /// Used where no command line exists, i.e. behind the C ABI.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_TOLERANCE") {
            options.tolerance = v;
        }
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_PAD") {
            options.pad_value = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "TIFF_SAMPLER_FALLBACK_MAGNIFICATION") {
            options.fallback_magnification = (v > 0.0).then_some(v);
        }
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_SLIDE_CACHE") {
            options.slide_cache_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_TILE_CACHE_BYTES") {
            options.tile_cache_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_BLOCK_SIZE") {
            options.block_size = v;
        }
        if let Some(v) = parse_var(&lookup, "TIFF_SAMPLER_BLOCK_CAPACITY") {
            options.block_capacity = v;
        }
        options
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

// =============================================================================
// Slide description
// =============================================================================

/// What the sampler knows about a slide.
#[derive(Debug, Clone, Serialize)]
pub struct SlideDescription {
    pub slide_id: String,
    pub format: SlideFormat,
    pub width: u32,
    pub height: u32,
    pub app_mag: Option<f64>,
    pub mpp: Option<f64>,
    pub vendor: Option<String>,
    pub levels: Vec<LevelInfo>,
}

// =============================================================================
// Tile Sampler
// =============================================================================

/// Samples fixed-magnification tiles from slides of one source.
///
/// Open slides, their byte blocks and decoded source tiles are cached and
/// shared by every request, so the sampler is meant to be long-lived and
/// shared behind an `Arc`.
pub struct TileSampler<S: SlideSource> {
    registry: Arc<SlideRegistry<S>>,
    tiles: DecodedTileCache,
    decoder: TileDecoder,
    options: SamplerOptions,
}

impl<S: SlideSource> TileSampler<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, SamplerOptions::default())
    }

    pub fn with_options(source: S, options: SamplerOptions) -> Self {
        let registry = SlideRegistry::with_capacity(
            source,
            options.slide_cache_capacity,
            options.block_size,
            options.block_capacity,
        );
        Self {
            registry: Arc::new(registry),
            tiles: DecodedTileCache::with_capacity(options.tile_cache_bytes),
            decoder: TileDecoder::new(),
            options,
        }
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }

    pub fn tile_cache(&self) -> &DecodedTileCache {
        &self.tiles
    }

    /// Resolve a request against its slide without reading any pixels.
    pub async fn plan(&self, request: &SampleRequest) -> Result<SamplePlan, SampleError> {
        request.validate()?;
        let cached = self.open(&request.slide_id).await?;
        self.plan_on(&cached, request)
    }

    /// Sample one tile.
    ///
    /// # Errors
    ///
    /// Fails when the request is degenerate, the slide cannot be opened or
    /// has no magnification, the selected level cannot be decoded, or the
    /// region starts outside the level. A region that runs off the level is
    /// not an error; the missing part is padded.
    pub async fn sample(&self, request: &SampleRequest) -> Result<Tile, SampleError> {
        request.validate()?;
        let cached = self.open(&request.slide_id).await?;
        let plan = self.plan_on(&cached, request)?;

        let mut sources = HashMap::new();
        for (tile_x, tile_y) in plan.tiles_needed() {
            if let Some(tile) = self.source_tile(&cached, &plan, tile_x, tile_y).await? {
                sources.insert((tile_x, tile_y), tile);
            }
        }

        Ok(stitch(&plan, &sources, self.options.pad_value))
    }

    /// Sample many tiles concurrently. Results are in request order.
    pub async fn sample_many(
        self: &Arc<Self>,
        requests: Vec<SampleRequest>,
    ) -> Vec<Result<Tile, SampleError>>
    where
        S: 'static,
    {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let sampler = Arc::clone(self);
                tokio::spawn(async move { sampler.sample(&request).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|e| {
                Err(SampleError::Internal {
                    message: format!("sampling task failed: {}", e),
                })
            }));
        }
        results
    }

    /// Dimensions, magnification and levels of a slide.
    pub async fn describe(&self, slide_id: &str) -> Result<SlideDescription, SampleError> {
        let cached = self.open(slide_id).await?;
        let slide = cached.slide();
        let (width, height) = slide.dimensions().ok_or_else(|| SampleError::NoPyramidLevels {
            slide_id: slide_id.to_string(),
        })?;
        let metadata = slide.metadata();
        Ok(SlideDescription {
            slide_id: slide_id.to_string(),
            format: slide.format(),
            width,
            height,
            app_mag: metadata.app_mag,
            mpp: metadata.mpp,
            vendor: metadata.vendor.clone(),
            levels: slide.levels(),
        })
    }

    /// Forget one slide and its decoded tiles.
    pub async fn invalidate_slide(&self, slide_id: &str) {
        self.registry.invalidate(slide_id).await;
        self.tiles.invalidate_slide(slide_id).await;
    }

    /// Drop every open slide and decoded tile.
    pub async fn clear_caches(&self) {
        self.registry.clear().await;
        self.tiles.clear().await;
    }

    /// `(bytes, capacity, entries)` of the decoded-tile cache.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        (
            self.tiles.size().await,
            self.tiles.capacity(),
            self.tiles.len().await,
        )
    }

    async fn open(&self, slide_id: &str) -> Result<Arc<CachedSlide<S::Reader>>, SampleError> {
        self.registry
            .get_slide(slide_id)
            .await
            .map_err(|e| SampleError::from_format(e, slide_id))
    }

    fn plan_on<R: RangeReader>(
        &self,
        cached: &CachedSlide<R>,
        request: &SampleRequest,
    ) -> Result<SamplePlan, SampleError> {
        let slide = cached.slide();
        let app_mag = slide
            .app_mag()
            .or(self.options.fallback_magnification)
            .ok_or_else(|| SampleError::MissingAppMag {
                slide_id: request.slide_id.clone(),
            })?;
        SamplePlan::build(slide, request, app_mag, self.options.tolerance)
    }

    /// One decoded source tile, `None` when the file stores no bytes for it.
    async fn source_tile<R: RangeReader>(
        &self,
        cached: &CachedSlide<R>,
        plan: &SamplePlan,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Option<Arc<DecodedTile>>, SampleError> {
        let key = DecodedTileKey::new(cached.slide_id(), plan.level, tile_x, tile_y);
        if let Some(tile) = self.tiles.get(&key).await {
            return Ok(Some(tile));
        }

        let raw = cached.read_raw_tile(plan.level, tile_x, tile_y).await?;
        if raw.is_empty() {
            debug!(slide = cached.slide_id(), level = plan.level, tile_x, tile_y, "sparse tile");
            return Ok(None);
        }

        let coding = cached
            .slide()
            .tile_data(plan.level)
            .map(LevelCoding::from_tile_data)
            .unwrap_or_default();
        let decoded = Arc::new(self.decoder.decode(
            plan.compression,
            &raw,
            coding,
            plan.tile_width,
            plan.tile_height,
        )?);

        self.tiles.put(key, decoded.clone()).await;
        Ok(Some(decoded))
    }
}

// =============================================================================
// Tests
// =============================================================================
