//! Geometry of a sample request.
//!
//! A request names a base-resolution point and a target magnification. The
//! plan resolves it against one slide: which level to read, how large the
//! region at that level is, and which part of which source tile lands where
//! in the output.

use tracing::debug;

use crate::error::SampleError;
use crate::format::tiff::{check_compression, check_sample_format, Compression, ValidationError};
use crate::slide::Slide;

use super::layout::TileLayout;

/// Keeps exact magnification ratios from truncating one pixel short.
const SIZE_EPSILON: f64 = 0.01;

/// One square tile to sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleRequest {
    pub slide_id: String,

    /// Left edge in level 0 pixels
    pub x: u64,

    /// Top edge in level 0 pixels
    pub y: u64,

    /// Side of the tile as seen at `magnification`
    pub tile_size: u16,

    /// Target objective magnification, e.g. 10 for 10x
    pub magnification: u8,
}

impl SampleRequest {
    pub fn new(
        slide_id: impl Into<String>,
        x: u64,
        y: u64,
        tile_size: u16,
        magnification: u8,
    ) -> Self {
        Self {
            slide_id: slide_id.into(),
            x,
            y,
            tile_size,
            magnification,
        }
    }

    /// Reject requests that cannot produce a tile on any slide.
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.tile_size == 0 {
            return Err(SampleError::InvalidTileSize {
                tile_size: self.tile_size,
            });
        }
        if self.magnification == 0 {
            return Err(SampleError::InvalidMagnification {
                magnification: self.magnification,
            });
        }
        Ok(())
    }
}

/// A run of output pixels along one axis taken from one source tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Tile index along the axis; may lie past the level's grid
    pub tile: u64,

    /// First pixel read inside the source tile
    pub src_start: u32,

    /// First output pixel written
    pub dst_start: u32,

    pub len: u32,
}

/// Split `size` output pixels into per-tile runs, the first run starting
/// `crop` pixels into `first_tile`.
fn spans(first_tile: u64, crop: u32, tile_dim: u32, size: u32) -> Vec<Span> {
    let mut out = Vec::new();
    let mut budget = size;
    let mut tile = first_tile;
    let mut src_start = crop;
    while budget > 0 {
        let len = (tile_dim - src_start).min(budget);
        out.push(Span {
            tile,
            src_start,
            dst_start: size - budget,
            len,
        });
        budget -= len;
        tile += 1;
        src_start = 0;
    }
    out
}

/// Resolved geometry for one request on one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePlan {
    pub level: usize,
    pub downsample: f64,
    pub app_mag: f64,

    /// Side of the region read at `level`, and of the returned tile
    pub img_size: u16,

    /// Region origin in level pixels
    pub origin_x: u64,
    pub origin_y: u64,

    pub first_tile_x: u64,
    pub first_tile_y: u64,
    pub crop_left: u32,
    pub crop_top: u32,

    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub level_width: u32,
    pub level_height: u32,

    pub compression: Compression,
    pub layout: TileLayout,
}

impl SamplePlan {
    /// Plan `request` on `slide`, scanned at `app_mag`.
    pub fn build(
        slide: &Slide,
        request: &SampleRequest,
        app_mag: f64,
        tolerance: f64,
    ) -> Result<Self, SampleError> {
        request.validate()?;

        let magnification = f64::from(request.magnification);
        let target = app_mag / magnification;
        let selection =
            slide
                .select_level(target, tolerance)
                .ok_or_else(|| SampleError::NoPyramidLevels {
                    slide_id: request.slide_id.clone(),
                })?;
        let level_index = selection.level_index;
        let downsample = selection.downsample;

        let level = slide
            .level(level_index)
            .ok_or_else(|| SampleError::NoPyramidLevels {
                slide_id: request.slide_id.clone(),
            })?;
        let compression = check_compression(level).map_err(level_error)?;
        let tile_data = slide
            .tile_data(level_index)
            .ok_or_else(|| SampleError::NoPyramidLevels {
                slide_id: request.slide_id.clone(),
            })?;
        check_sample_format(level_index, &tile_data.sample_format).map_err(level_error)?;

        let img_size = output_size(request.tile_size, app_mag, downsample, magnification)?;

        let origin_x = (request.x as f64 / downsample).trunc() as u64;
        let origin_y = (request.y as f64 / downsample).trunc() as u64;
        if origin_x >= u64::from(level.width) || origin_y >= u64::from(level.height) {
            return Err(SampleError::OutOfBounds {
                level: level_index,
                x: request.x,
                y: request.y,
                width: level.width,
                height: level.height,
                downsample,
            });
        }

        let tile_w = u64::from(level.tile_width);
        let tile_h = u64::from(level.tile_height);
        let plan = SamplePlan {
            level: level_index,
            downsample,
            app_mag,
            img_size,
            origin_x,
            origin_y,
            first_tile_x: origin_x / tile_w,
            first_tile_y: origin_y / tile_h,
            crop_left: (origin_x % tile_w) as u32,
            crop_top: (origin_y % tile_h) as u32,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            tiles_x: level.tiles_x,
            tiles_y: level.tiles_y,
            level_width: level.width,
            level_height: level.height,
            compression,
            layout: TileLayout::for_compression(compression),
        };

        debug!(
            slide = %request.slide_id,
            target_downsample = target,
            level = plan.level,
            downsample = plan.downsample,
            img_size = plan.img_size,
            origin_x = plan.origin_x,
            origin_y = plan.origin_y,
            "planned sample"
        );
        Ok(plan)
    }

    pub fn column_spans(&self) -> Vec<Span> {
        spans(
            self.first_tile_x,
            self.crop_left,
            self.tile_width,
            u32::from(self.img_size),
        )
    }

    pub fn row_spans(&self) -> Vec<Span> {
        spans(
            self.first_tile_y,
            self.crop_top,
            self.tile_height,
            u32::from(self.img_size),
        )
    }

    /// Source tiles inside the level grid that the region touches, row by row.
    pub fn tiles_needed(&self) -> Vec<(u32, u32)> {
        let columns: Vec<u32> = self
            .column_spans()
            .iter()
            .filter(|span| span.tile < u64::from(self.tiles_x))
            .map(|span| span.tile as u32)
            .collect();
        self.row_spans()
            .iter()
            .filter(|span| span.tile < u64::from(self.tiles_y))
            .flat_map(|row| columns.iter().map(move |&col| (col, row.tile as u32)))
            .collect()
    }
}

/// Side of the region read at a level of `downsample` so that, viewed at
/// `magnification`, it covers `tile_size` pixels.
pub fn output_size(
    tile_size: u16,
    app_mag: f64,
    downsample: f64,
    magnification: f64,
) -> Result<u16, SampleError> {
    let divisor = downsample * magnification - SIZE_EPSILON;
    let size = (f64::from(tile_size) * app_mag / divisor).trunc();
    if !size.is_finite() || size < 1.0 || size > f64::from(u16::MAX) {
        return Err(SampleError::OutputTooLarge { size });
    }
    Ok(size as u16)
}

fn level_error(error: ValidationError) -> SampleError {
    match error {
        ValidationError::UnsupportedCompression {
            level_index,
            compression,
            ..
        } => SampleError::UnsupportedCompression {
            level: level_index,
            compression,
        },
        ValidationError::UnsupportedSampleFormat {
            level_index,
            message,
        } => SampleError::UnsupportedSampleFormat {
            level: level_index,
            message,
        },
        other => SampleError::Slide(other.into()),
    }
}
