//! Pyramid level identification and level selection.
//!
//! A slide file chains many IFDs: the pyramid levels, plus a thumbnail, a
//! label and a macro photograph. Levels are the tiled IFDs with tile tables
//! that are not marked as associated images, ordered by decreasing width so
//! level 0 is the base resolution. Any step between levels is accepted.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs followed in the chain
const MAX_IFDS: usize = 100;

/// NewSubfileType bit for transparency masks
const SUBFILE_MASK: u32 = 0x4;

/// First word of a description line naming an associated image
const ASSOCIATED_IMAGE_MARKERS: &[&str] = &["label", "macro"];

/// Default tolerance when matching a level downsample to a target
pub const DEFAULT_DOWNSAMPLE_TOLERANCE: f64 = 0.2;

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution of the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 = base resolution
    pub level_index: usize,

    /// Position of the IFD in the file's chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tile_count: u32,

    /// Base width over this level's width
    pub downsample: f64,

    /// Raw TIFF compression code, 1 when the tag is absent
    pub compression: u16,

    pub ifd: Ifd,
    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level from a tiled IFD. `None` if dimension tags are missing.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;
        if tile_width == 0 || tile_height == 0 {
            return None;
        }

        // TIFF default compression is 1 (none)
        let compression = ifd.compression(byte_order).unwrap_or(1);

        let tiles_x = width.div_ceil(tile_width);
        let tiles_y = height.div_ceil(tile_height);

        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned();
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            tile_count: tiles_x.saturating_mul(tiles_y),
            downsample: 1.0,
            compression,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    /// Row-major index of a tile, `None` outside the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }
}

// =============================================================================
// Level selection
// =============================================================================

/// Level chosen for a target downsample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSelection {
    pub level_index: usize,

    /// Downsample used for geometry. 1.0 when the request upsamples.
    pub downsample: f64,
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The pyramid levels of a TIFF file, level 0 first.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,

    /// Tiled or stripped IFDs that are not levels (thumbnail, label, macro)
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    /// Read the header and IFD chain and identify the levels.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;
        let mut associated = Vec::with_capacity(ifds.len());
        for ifd in &ifds {
            associated.push(Self::is_associated_image(reader, &header, ifd).await?);
        }
        Ok(Self::build_pyramid(header, ifds, &associated))
    }

    /// Whether an IFD holds a mask, label or macro rather than slide pixels.
    ///
    /// Masks are flagged in NewSubfileType. Aperio names labels and macros on
    /// the second line of their ImageDescription ("label 415x422").
    async fn is_associated_image<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<bool, TiffError> {
        if ifd.subfile_type(header.byte_order) & SUBFILE_MASK != 0 {
            return Ok(true);
        }
        if !ifd.is_tiled() {
            return Ok(false);
        }
        let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
            return Ok(false);
        };
        let description = ValueReader::new(reader, header).read_string(entry).await?;
        Ok(names_associated_image(&description))
    }

    /// Read the first IFD only.
    pub async fn read_first_ifd<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Ifd, TiffError> {
        Self::read_ifd(reader, header, header.first_ifd_offset).await
    }

    async fn read_ifd<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Ifd, TiffError> {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
        let entry_count = header.read_entry_count(&count_bytes);
        let size = Ifd::calculate_size(entry_count.min(super::parser::MAX_IFD_ENTRIES + 1), header);
        let available = (reader.size() - offset) as usize;
        let ifd_bytes = reader.read_exact_at(offset, size.min(available)).await?;
        Ifd::parse(&ifd_bytes, header)
    }

    async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if !seen.insert(offset) {
                debug!(offset, "IFD chain loops back, stopping");
                break;
            }
            let ifd = Self::read_ifd(reader, header, offset).await?;
            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>, associated: &[bool]) -> Self {
        let byte_order = header.byte_order;
        let mut candidates = Vec::new();
        let mut other_ifds = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            let skip = associated.get(ifd_index).copied().unwrap_or(false);
            match PyramidLevel::from_ifd(ifd.clone(), ifd_index, byte_order) {
                Some(level) if !skip && level.has_tile_data() => candidates.push(level),
                _ => other_ifds.push((ifd_index, ifd)),
            }
        }

        // Stable: equal widths keep file order
        candidates.sort_by_key(|l| std::cmp::Reverse(l.width));
        let levels = Self::assign_downsamples(candidates);

        TiffPyramid {
            header,
            levels,
            other_ifds,
        }
    }

    /// Number the levels and set their downsample against the base width.
    /// A level no narrower than the one before it repeats a resolution and
    /// is dropped.
    fn assign_downsamples(candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        let Some(base_width) = candidates.first().map(|l| f64::from(l.width)) else {
            return candidates;
        };

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for mut level in candidates {
            if levels.last().is_some_and(|prev| level.width >= prev.width) {
                debug!(
                    ifd = level.ifd_index,
                    width = level.width,
                    "duplicate level width, skipping"
                );
                continue;
            }
            level.level_index = levels.len();
            level.downsample = base_width / f64::from(level.width);
            levels.push(level);
        }
        levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }

    /// Pick the level to sample for a target downsample.
    ///
    /// Targets below 1 upsample from level 0. Otherwise levels are walked
    /// from the base: a level within `tolerance` of the target is taken, the
    /// first level coarser than the target stops the walk and its finer
    /// neighbour is taken, and when every level is finer the coarsest wins.
    pub fn select_level(&self, target: f64, tolerance: f64) -> Option<LevelSelection> {
        let base = self.levels.first()?;
        if target < 1.0 {
            return Some(LevelSelection {
                level_index: base.level_index,
                downsample: 1.0,
            });
        }

        let mut closest: Option<&PyramidLevel> = None;
        for level in &self.levels {
            if (level.downsample - target).abs() <= tolerance {
                closest = Some(level);
                break;
            }
            if level.downsample > target {
                break;
            }
            closest = Some(level);
        }

        let level = closest.unwrap_or(base);
        Some(LevelSelection {
            level_index: level.level_index,
            downsample: level.downsample,
        })
    }
}

/// Whether a description names a label or macro image.
fn names_associated_image(description: &str) -> bool {
    description.lines().any(|line| {
        line.split_whitespace()
            .next()
            .map(|word| ASSOCIATED_IMAGE_MARKERS.contains(&word.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    })
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Sample layout of a level as declared by its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    /// First BitsPerSample value, 1 when absent
    pub bits_per_sample: u16,

    /// 1 when absent
    pub samples_per_pixel: u16,

    /// 1 (contiguous) when absent
    pub planar_config: u16,

    /// 1 (none) when absent
    pub predictor: u16,
}

impl SampleFormat {
    /// 8-bit contiguous RGB.
    pub const RGB8: SampleFormat = SampleFormat {
        bits_per_sample: 8,
        samples_per_pixel: 3,
        planar_config: 1,
        predictor: 1,
    };
}

/// Tile tables and per-level tags needed to fetch and decode tiles.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
    pub sample_format: SampleFormat,
}

impl TileData {
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets_entry = level
            .tile_offsets_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .tile_byte_counts_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;

        let jpeg_tables = match &level.jpeg_tables_entry {
            Some(entry) => Some(values.read_raw_bytes(entry).await?),
            None => None,
        };

        let bits_per_sample = match level.ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => values
                .read_u32_array(entry)
                .await?
                .first()
                .map(|&v| v as u16)
                .unwrap_or(1),
            None => 1,
        };

        let byte_order = header.byte_order;
        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
            sample_format: SampleFormat {
                bits_per_sample,
                samples_per_pixel: level.ifd.samples_per_pixel(byte_order),
                planar_config: level.ifd.planar_config(byte_order),
                predictor: level.ifd.predictor(byte_order),
            },
        })
    }

    /// Offset and size of a tile, `None` past the table.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
