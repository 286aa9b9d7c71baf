//! Command-line configuration.
//!
//! Every option can also be set through a `TIFF_SAMPLER_` environment
//! variable:
//!
//! - `TIFF_SAMPLER_TILE_SIZE` - Output tile side (default: 256)
//! - `TIFF_SAMPLER_MAGNIFICATION` - Target magnification (default: 10)
//! - `TIFF_SAMPLER_TOLERANCE` - Level downsample tolerance (default: 0.2)
//! - `TIFF_SAMPLER_PAD` - Byte for pixels outside the slide (default: 255)
//! - `TIFF_SAMPLER_FALLBACK_MAGNIFICATION` - Base magnification for slides without AppMag
//! - `TIFF_SAMPLER_S3_BUCKET` - Read slides from this bucket instead of the filesystem
//! - `TIFF_SAMPLER_S3_ENDPOINT` - Custom endpoint for S3-compatible services
//! - `TIFF_SAMPLER_S3_REGION` - AWS region (default: us-east-1)

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::format::tiff::DEFAULT_DOWNSAMPLE_TOLERANCE;
use crate::tile::{SamplerOptions, DEFAULT_PAD_VALUE};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_TILE_SIZE: u16 = 256;

pub const DEFAULT_MAGNIFICATION: u8 = 10;

pub const DEFAULT_REGION: &str = "us-east-1";

pub const DEFAULT_OUTPUT: &str = "tile.png";

/// Output extensions `image` is built to encode
const OUTPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiff-sampler - fixed-magnification tiles from Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiff-sampler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sample one tile and write it as an image.
    Sample(SampleConfig),

    /// Print levels, magnification and format of a slide.
    Info(InfoConfig),
}

/// Where slides are read from.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Read slides from this S3 bucket; the slide argument is the object key.
    #[arg(long, env = "TIFF_SAMPLER_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "TIFF_SAMPLER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, default_value = DEFAULT_REGION, env = "TIFF_SAMPLER_S3_REGION")]
    pub s3_region: String,
}

impl SourceConfig {
    fn validate(&self) -> Result<(), String> {
        if matches!(self.s3_bucket.as_deref(), Some("")) {
            return Err("S3 bucket name must not be empty".to_string());
        }
        if self.s3_endpoint.is_some() && self.s3_bucket.is_none() {
            return Err("--s3-endpoint requires --s3-bucket".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct SampleConfig {
    /// Slide path (or object key with --s3-bucket).
    pub slide: String,

    /// Left edge in level 0 pixels.
    #[arg(short, long, default_value_t = 0)]
    pub x: u64,

    /// Top edge in level 0 pixels.
    #[arg(short, long, default_value_t = 0)]
    pub y: u64,

    /// Tile side at the target magnification.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TIFF_SAMPLER_TILE_SIZE")]
    pub tile_size: u16,

    /// Target objective magnification (e.g. 10 for 10x).
    #[arg(short, long, default_value_t = DEFAULT_MAGNIFICATION, env = "TIFF_SAMPLER_MAGNIFICATION")]
    pub magnification: u8,

    /// Resize the sampled tile to this side; defaults to --tile-size.
    #[arg(long)]
    pub resize: Option<u32>,

    /// Keep the tile at the size it was read at the selected level.
    #[arg(long, default_value_t = false, conflicts_with = "resize")]
    pub no_resize: bool,

    /// Output image; format from the extension (png, jpg).
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Maximum distance between a level's downsample and the target.
    #[arg(long, default_value_t = DEFAULT_DOWNSAMPLE_TOLERANCE, env = "TIFF_SAMPLER_TOLERANCE")]
    pub tolerance: f64,

    /// Byte written for pixels outside the slide.
    #[arg(long, default_value_t = DEFAULT_PAD_VALUE, env = "TIFF_SAMPLER_PAD")]
    pub pad: u8,

    /// Base magnification for slides whose description has no AppMag.
    #[arg(long, env = "TIFF_SAMPLER_FALLBACK_MAGNIFICATION")]
    pub fallback_magnification: Option<f64>,

    #[command(flatten)]
    pub source: SourceConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SampleConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.slide.is_empty() {
            return Err("slide path is required".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.magnification == 0 {
            return Err("magnification must be greater than 0".to_string());
        }
        if self.resize == Some(0) {
            return Err("resize must be greater than 0".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err("tolerance must be a non-negative number".to_string());
        }
        if let Some(mag) = self.fallback_magnification {
            if !(mag.is_finite() && mag > 0.0) {
                return Err("fallback_magnification must be greater than 0".to_string());
            }
        }
        if !has_image_extension(&self.output) {
            return Err(format!(
                "output must end in one of: {}",
                OUTPUT_EXTENSIONS.join(", ")
            ));
        }
        self.source.validate()
    }

    /// Side the written image will have, `None` to keep the sampled size.
    pub fn output_side(&self) -> Option<u32> {
        if self.no_resize {
            None
        } else {
            Some(self.resize.unwrap_or(u32::from(self.tile_size)))
        }
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            tolerance: self.tolerance,
            pad_value: self.pad,
            fallback_magnification: self.fallback_magnification,
            ..SamplerOptions::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Slide path (or object key with --s3-bucket).
    pub slide: String,

    /// Print the description as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub source: SourceConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.slide.is_empty() {
            return Err("slide path is required".to_string());
        }
        self.source.validate()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            OUTPUT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

// =============================================================================
// Tests
// =============================================================================
