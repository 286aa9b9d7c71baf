//! # tiff-sampler
//!
//! Fixed-magnification RGB tiles from pyramidal Whole Slide Images.
//!
//! Given a slide, a point in base-resolution pixels and a target objective
//! magnification, the sampler picks the pyramid level closest to that
//! magnification, reads and decodes the source tiles under the region and
//! stitches them into one square tile. Slides are read through byte ranges,
//! from local files or S3, without loading whole files.
//!
//! ## Features
//!
//! - **Formats**: Aperio SVS and tiled TIFF/BigTIFF with uncompressed, JPEG
//!   or JPEG 2000 tiles
//! - **C ABI**: `load_single_tile` / `free_tile` and friends, built as a
//!   `cdylib` (see [`ffi`])
//! - **Caching**: open slides, file blocks and decoded tiles are shared
//!   between calls
//! - **Tensors**: channel-first conversion, bilinear resize, image output
//!
//! ## Modules
//!
//! - [`io`] - byte-range readers (local, S3) and block caching
//! - [`mod@format`] - TIFF structure, SVS metadata and JPEG stream handling
//! - [`slide`] - opened slides and the slide registry
//! - [`tile`] - sample planning, decoding, stitching and tensors
//! - [`ffi`] - the C ABI
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiff_sampler::{LocalSlideSource, SampleRequest, TileSampler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiff_sampler::SampleError> {
//!     let sampler = TileSampler::new(LocalSlideSource::new());
//!     let request = SampleRequest::new("slides/CMU-1.svs", 10_000, 8_000, 256, 10);
//!
//!     let tile = sampler.sample(&request).await?;
//!     let tensor = tile.to_chw().resize(256);
//!     tensor.save("tile.png")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;


// Re-export commonly used types
pub use config::{Cli, Command, InfoConfig, SampleConfig, SourceConfig};
pub use error::{FormatError, IoError, SampleError, TiffError};
pub use ffi::CTile;
pub use format::tiff::{
    check_compression, check_sample_format, validate_level, validate_pyramid, ByteOrder,
    Compression, Ifd, IfdEntry, LevelSelection, PyramidLevel, SampleFormat, TiffHeader,
    TiffPyramid, TiffTag, TileData, ValidationError, ValidationResult,
};
pub use format::{detect_format, is_tiff_header, prepare_tile_jpeg, SlideFormat, SvsMetadata};
pub use io::{create_s3_client, BlockCache, LocalFileReader, RangeReader, S3RangeReader};
pub use slide::{
    CachedSlide, LevelInfo, LocalSlideSource, S3SlideSource, Slide, SlideRegistry, SlideSource,
};
pub use tile::{
    DecodedTile, DecodedTileCache, ImageTensor, SamplePlan, SampleRequest, SamplerOptions,
    SlideDescription, Tile, TileDecoder, TileLayout, TileSampler,
};
