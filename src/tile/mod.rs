//! Tile sampling.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        C ABI (ffi) / CLI (main)         │
//! └────────────────────┬────────────────────┘
//!                      │ SampleRequest
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileSampler                │
//! │  ┌────────────┐  ┌───────────────────┐  │
//! │  │ SamplePlan │  │ DecodedTileCache  │  │
//! │  │ + stitch   │  │ + TileDecoder     │  │
//! │  └────────────┘  └───────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             SlideRegistry               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! - [`TileSampler`]: opens slides, plans, fetches and decodes source tiles,
//!   stitches the result
//! - [`SamplePlan`]: level choice and region geometry for one request
//! - [`TileDecoder`]: raw, LZW, Deflate, PackBits, JPEG and JPEG 2000 tile
//!   decoding
//! - [`DecodedTileCache`]: size-bounded LRU of decoded source tiles
//! - [`Tile`]: the square output buffer, height-first or channel-first
//! - [`ImageTensor`]: `(3, H, W)` view of a tile with resize and save

mod buffer;
mod cache;
mod decoder;
mod decompress;
mod layout;
mod plan;
mod service;
mod stitch;
mod tensor;

pub use buffer::{tile_byte_len, Tile};
pub use cache::{DecodedTileCache, DecodedTileKey, DEFAULT_TILE_CACHE_BYTES};
pub use decoder::{DecodedTile, LevelCoding, TileDecoder};
pub use layout::{TileLayout, CHANNELS};
pub use plan::{output_size, SamplePlan, SampleRequest, Span};
pub use service::{SamplerOptions, SlideDescription, TileSampler};
pub use stitch::{stitch, DEFAULT_PAD_VALUE};
pub use tensor::ImageTensor;
