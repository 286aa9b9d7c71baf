//! An opened slide: pyramid, tile tables and metadata.
//!
//! Opening reads only structure (header, IFD chain, tile tables, JPEG tables
//! and the ImageDescription). Tile payloads are fetched on demand with
//! [`Slide::read_raw_tile`].

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FormatError, TiffError};
use crate::format::svs::{read_image_description, SvsMetadata};
use crate::format::tiff::{
    validate_pyramid, Compression, Ifd, LevelSelection, PyramidLevel, TiffPyramid, TileData,
    BIGTIFF_HEADER_SIZE,
};
use crate::format::{is_tiff_header, SlideFormat};
use crate::io::RangeReader;

/// Summary of one pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelInfo {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub downsample: f64,
    pub compression: u16,
    pub compression_name: String,
}

impl LevelInfo {
    fn from_level(level: &PyramidLevel) -> Self {
        let compression_name = match Compression::from_u16(level.compression) {
            Some(c) => c.name().to_string(),
            None => format!("Unknown ({})", level.compression),
        };
        LevelInfo {
            level: level.level_index,
            width: level.width,
            height: level.height,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
            tiles_x: level.tiles_x,
            tiles_y: level.tiles_y,
            downsample: level.downsample,
            compression: level.compression,
            compression_name,
        }
    }
}

/// A parsed slide, independent of where its bytes come from.
#[derive(Debug, Clone)]
pub struct Slide {
    format: SlideFormat,
    pyramid: TiffPyramid,

    /// Tile tables, indexed like `pyramid.levels`
    tiles: Vec<TileData>,

    metadata: SvsMetadata,
}

impl Slide {
    /// Parse the structure of the slide behind `reader`.
    ///
    /// Fails when the file is not a TIFF or has no usable pyramid. Codec and
    /// sample layout problems of single levels are logged and left to the
    /// sampler, which checks them on the level it selects.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, FormatError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        let header = reader.read_exact_at(0, header_len).await?;
        if !is_tiff_header(&header) {
            return Err(FormatError::UnsupportedFormat {
                reason: format!("{} is not a TIFF or BigTIFF file", reader.identifier()),
            });
        }

        let pyramid = TiffPyramid::parse(reader).await?;

        let validation = validate_pyramid(&pyramid);
        for warning in &validation.warnings {
            warn!(slide = reader.identifier(), "{}", warning);
        }
        validation.into_result()?;

        let mut tiles = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            tiles.push(TileData::load(reader, level, &pyramid.header).await?);
        }

        let description = match first_ifd(&pyramid) {
            Some(ifd) => read_image_description(reader, ifd, &pyramid.header).await?,
            None => None,
        };
        let format = SlideFormat::from_description(description.as_deref());
        let metadata = description
            .as_deref()
            .map(SvsMetadata::parse)
            .unwrap_or_default();

        debug!(
            slide = reader.identifier(),
            format = format.name(),
            levels = pyramid.level_count(),
            app_mag = ?metadata.app_mag,
            "opened slide"
        );

        Ok(Slide {
            format,
            pyramid,
            tiles,
            metadata,
        })
    }

    pub fn format(&self) -> SlideFormat {
        self.format
    }

    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    /// Scan magnification, if the description carries one.
    pub fn app_mag(&self) -> Option<f64> {
        self.metadata.app_mag
    }

    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    /// Size of level 0.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.pyramid.dimensions()
    }

    pub fn level(&self, level: usize) -> Option<&PyramidLevel> {
        self.pyramid.get_level(level)
    }

    pub fn tile_data(&self, level: usize) -> Option<&TileData> {
        self.tiles.get(level)
    }

    pub fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.level(level).map(LevelInfo::from_level)
    }

    pub fn levels(&self) -> Vec<LevelInfo> {
        self.pyramid.levels.iter().map(LevelInfo::from_level).collect()
    }

    pub fn select_level(&self, target_downsample: f64, tolerance: f64) -> Option<LevelSelection> {
        self.pyramid.select_level(target_downsample, tolerance)
    }

    /// Stored bytes of one tile, exactly as in the file.
    ///
    /// A tile recorded with zero bytes yields an empty buffer.
    pub async fn read_raw_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        let pyramid_level = self.level(level).ok_or_else(|| TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range ({} levels)", level, self.level_count()),
        })?;
        let location = pyramid_level
            .tile_index(tile_x, tile_y)
            .and_then(|index| self.tiles.get(level)?.get_tile_location(index));
        let (offset, size) = location.ok_or_else(|| TiffError::InvalidTagValue {
            tag: "TileOffsets",
            message: format!("no tile ({}, {}) at level {}", tile_x, tile_y, level),
        })?;

        if size == 0 {
            return Ok(Bytes::new());
        }
        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "TileByteCounts",
            message: format!("tile of {} bytes", size),
        })?;
        Ok(reader.read_exact_at(offset, size).await?)
    }
}

/// The IFD at position 0 of the chain, wherever it was classified.
fn first_ifd(pyramid: &TiffPyramid) -> Option<&Ifd> {
    pyramid
        .levels
        .iter()
        .find(|level| level.ifd_index == 0)
        .map(|level| &level.ifd)
        .or_else(|| {
            pyramid
                .other_ifds
                .iter()
                .find(|(index, _)| *index == 0)
                .map(|(_, ifd)| ifd)
        })
}
