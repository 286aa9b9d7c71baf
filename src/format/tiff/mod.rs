//! TIFF and BigTIFF structure parsing.
//!
//! Slides are read through byte ranges only: the header, the IFD chain, and
//! the tag values needed to locate tiles. Pixel data is never touched here.

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};
pub use pyramid::{
    LevelSelection, PyramidLevel, SampleFormat, TiffPyramid, TileData,
    DEFAULT_DOWNSAMPLE_TOLERANCE,
};
pub use tags::{Compression, FieldType, TiffTag};
pub use validation::{
    check_compression, check_sample_format, validate_level, validate_pyramid, ValidationError,
    ValidationResult,
};
pub use values::{decode_integers, ValueReader};
