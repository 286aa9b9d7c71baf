//! Checks that a pyramid can be sampled.
//!
//! Structural problems (no levels, missing tile tables, zero-sized tiles) are
//! fatal when a slide is opened. Codec and sample layout are checked on the
//! level a request selects, so a slide with one odd level still serves the
//! others.
//!
//! Supported levels are tiled, 8-bit, 3 samples per pixel, contiguous, and
//! uncompressed, JPEG or Aperio JPEG 2000.

use crate::error::TiffError;

use super::pyramid::{PyramidLevel, SampleFormat, TiffPyramid};
use super::tags::Compression;

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating a pyramid.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,

    /// Non-fatal findings, logged by the caller
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// The first error as a `TiffError`.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(error) => Err(error.into()),
        }
    }
}

/// A reason a level or pyramid cannot be sampled.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnsupportedCompression {
        level_index: usize,
        compression: u16,
        compression_name: String,
    },

    MissingTileTags {
        level_index: usize,
        missing_tags: Vec<&'static str>,
    },

    NoPyramidLevels,

    InvalidTileDimensions {
        level_index: usize,
        tile_width: u32,
        tile_height: u32,
    },

    /// Not 8-bit contiguous RGB
    UnsupportedSampleFormat {
        level_index: usize,
        message: String,
    },
}

impl From<ValidationError> for TiffError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::UnsupportedCompression {
                compression_name, ..
            } => TiffError::UnsupportedCompression(compression_name),
            ValidationError::MissingTileTags { missing_tags, .. } => {
                TiffError::MissingTag(missing_tags.first().copied().unwrap_or("TileOffsets"))
            }
            ValidationError::NoPyramidLevels => {
                TiffError::MissingTag("No valid pyramid levels found")
            }
            ValidationError::InvalidTileDimensions {
                tile_width,
                tile_height,
                ..
            } => TiffError::InvalidTagValue {
                tag: "TileWidth/TileLength",
                message: format!("invalid tile size {}x{}", tile_width, tile_height),
            },
            ValidationError::UnsupportedSampleFormat { message, .. } => {
                TiffError::InvalidTagValue {
                    tag: "BitsPerSample/SamplesPerPixel/PlanarConfiguration/Predictor",
                    message,
                }
            }
        }
    }
}

// =============================================================================
// Level checks
// =============================================================================

/// The codec of a level, if it can be decoded.
pub fn check_compression(level: &PyramidLevel) -> Result<Compression, ValidationError> {
    match Compression::from_u16(level.compression) {
        Some(compression) if compression.is_supported() => Ok(compression),
        Some(compression) => Err(ValidationError::UnsupportedCompression {
            level_index: level.level_index,
            compression: level.compression,
            compression_name: compression.name().to_string(),
        }),
        None => Err(ValidationError::UnsupportedCompression {
            level_index: level.level_index,
            compression: level.compression,
            compression_name: format!("Unknown ({})", level.compression),
        }),
    }
}

/// Require 8-bit contiguous RGB, with no predictor or horizontal
/// differencing.
pub fn check_sample_format(
    level_index: usize,
    format: &SampleFormat,
) -> Result<(), ValidationError> {
    let message = if format.planar_config != 1 {
        format!("samples are not contiguous (PlanarConfiguration {})", format.planar_config)
    } else if format.bits_per_sample != 8 {
        format!("expected 8 bits per sample, has {}", format.bits_per_sample)
    } else if !matches!(format.predictor, 1 | 2) {
        format!("unsupported Predictor {}", format.predictor)
    } else if format.samples_per_pixel != 3 {
        format!("expected 3 samples per pixel (RGB), has {}", format.samples_per_pixel)
    } else {
        return Ok(());
    };

    Err(ValidationError::UnsupportedSampleFormat {
        level_index,
        message,
    })
}

/// Structural checks on one level. Codec problems are warnings.
pub fn validate_level(level: &PyramidLevel) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if !level.has_tile_data() {
        let missing = [
            ("TileOffsets", level.tile_offsets_entry.is_none()),
            ("TileByteCounts", level.tile_byte_counts_entry.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();
        result.add_error(ValidationError::MissingTileTags {
            level_index: level.level_index,
            missing_tags: missing,
        });
    }

    if level.tile_width == 0 || level.tile_height == 0 {
        result.add_error(ValidationError::InvalidTileDimensions {
            level_index: level.level_index,
            tile_width: level.tile_width,
            tile_height: level.tile_height,
        });
    } else if level.tile_width > 4096 || level.tile_height > 4096 {
        result.add_warning(format!(
            "Level {}: large tiles ({}x{})",
            level.level_index, level.tile_width, level.tile_height
        ));
    }

    if let Err(ValidationError::UnsupportedCompression {
        compression_name, ..
    }) = check_compression(level)
    {
        result.add_warning(format!(
            "Level {}: {} tiles cannot be decoded",
            level.level_index, compression_name
        ));
    }

    if level.compression == 7 && level.jpeg_tables_entry.is_none() {
        result.add_warning(format!(
            "Level {}: no JPEGTables tag (tiles must carry their own tables)",
            level.level_index
        ));
    }

    result
}

/// Validate every level of a pyramid.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if pyramid.levels.is_empty() {
        result.add_error(ValidationError::NoPyramidLevels);
        return result;
    }

    for level in &pyramid.levels {
        result.merge(validate_level(level));
    }

    result
}

// =============================================================================
// Tests
// =============================================================================
