//! Slide format detection.
//!
//! Every supported slide is a TIFF or BigTIFF. Aperio files are told apart
//! by the "Aperio" banner in the ImageDescription of the first IFD; anything
//! else with a usable pyramid is a generic tiled TIFF.

use serde::Serialize;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::svs::read_image_description;
use super::tiff::{ByteOrder, TiffHeader, TiffPyramid, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

const APERIO_MARKER: &str = "Aperio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlideFormat {
    AperioSvs,
    GenericTiff,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }

    /// Classify from the first ImageDescription, if any.
    pub fn from_description(description: Option<&str>) -> Self {
        match description {
            Some(text) if text.contains(APERIO_MARKER) => SlideFormat::AperioSvs,
            _ => SlideFormat::GenericTiff,
        }
    }
}

/// Read the header and first IFD of `reader` and classify the file.
///
/// Fails with `UnsupportedFormat` when the file is not a TIFF at all.
pub async fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    let size = reader.size();
    if size < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("{} bytes is too small for a TIFF header", size),
        });
    }

    let header_len = BIGTIFF_HEADER_SIZE.min(size as usize);
    let header_bytes = reader.read_exact_at(0, header_len).await?;
    if !is_tiff_header(&header_bytes) {
        return Err(FormatError::UnsupportedFormat {
            reason: "not a TIFF or BigTIFF file".to_string(),
        });
    }
    let header = TiffHeader::parse(&header_bytes, size)?;

    let ifd = TiffPyramid::read_first_ifd(reader, &header).await?;
    let description = read_image_description(reader, &ifd, &header).await?;
    Ok(SlideFormat::from_description(description.as_deref()))
}

/// Byte order mark followed by version 42 or 43.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    let byte_order = match &bytes[..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };
    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}
