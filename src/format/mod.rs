//! Slide file formats.
//!
//! [`tiff`] reads the TIFF structure and pyramid, [`svs`] the Aperio
//! metadata, [`jpeg`] repairs abbreviated JPEG tiles and [`detect`] tells
//! Aperio slides from generic pyramidal TIFFs.

pub mod detect;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use jpeg::prepare_tile_jpeg;
pub use svs::{read_image_description, SvsMetadata};
