//! Decoding stored tiles to 8-bit RGB samples.
//!
//! Uncompressed, LZW, Deflate, PackBits and JPEG tiles decode to interleaved
//! pixels. Aperio JPEG 2000 tiles decode to one plane per component, and the
//! planes are kept as they are so stitching can copy them channel-first.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::error::SampleError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::format::tiff::{Compression, TileData};

use super::decompress::{
    decompress_deflate, decompress_lzw, decompress_packbits, undo_horizontal_predictor,
};
use super::layout::{TileLayout, CHANNELS};

/// Horizontal differencing
const PREDICTOR_HORIZONTAL: u16 = 2;

/// Per-level tag values that shape decoding.
#[derive(Debug, Clone, Copy)]
pub struct LevelCoding<'a> {
    /// JPEGTables, merged into abbreviated JPEG tiles
    pub jpeg_tables: Option<&'a [u8]>,

    /// TIFF Predictor of lossless tiles
    pub predictor: u16,
}

impl Default for LevelCoding<'_> {
    fn default() -> Self {
        Self {
            jpeg_tables: None,
            predictor: 1,
        }
    }
}

impl<'a> LevelCoding<'a> {
    pub fn from_tile_data(data: &'a TileData) -> Self {
        Self {
            jpeg_tables: data.jpeg_tables.as_deref(),
            predictor: data.sample_format.predictor,
        }
    }
}

/// One source tile after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,

    /// `HeightFirst` for interleaved pixels, `ChannelFirst` for planes
    pub layout: TileLayout,

    pub data: Vec<u8>,
}

impl DecodedTile {
    /// Sample at `(channel, row, col)`, `None` outside the decoded pixels.
    #[inline]
    pub fn sample(&self, channel: usize, row: u32, col: u32) -> Option<u8> {
        if channel >= CHANNELS || row >= self.height || col >= self.width {
            return None;
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let (row, col) = (row as usize, col as usize);
        let index = match self.layout {
            TileLayout::HeightFirst => (row * w + col) * CHANNELS + channel,
            TileLayout::ChannelFirst => channel * w * h + row * w + col,
        };
        self.data.get(index).copied()
    }

    /// Heap size, used to bound the decoded-tile cache.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

/// Decodes tiles of the codecs the sampler supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileDecoder;

impl TileDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `data`, a tile of `tile_width` x `tile_height` stored with
    /// `compression`.
    pub fn decode(
        &self,
        compression: Compression,
        data: &[u8],
        coding: LevelCoding<'_>,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<DecodedTile, SampleError> {
        let expected = tile_width as usize * tile_height as usize * CHANNELS;
        let stored = match compression {
            Compression::None => return Ok(decode_raw(data, tile_width, tile_height)),
            Compression::Jpeg => return decode_jpeg(data, coding.jpeg_tables),
            Compression::Jpeg2000 | Compression::Jpeg2000Rgb => return decode_jpeg2000(data),
            Compression::Lzw => decompress_lzw(data, expected)?,
            Compression::Deflate | Compression::AdobeDeflate => decompress_deflate(data, expected)?,
            Compression::PackBits => decompress_packbits(data, expected),
            other => {
                return Err(SampleError::Decode {
                    message: format!("no decoder for {} tiles", other.name()),
                });
            }
        };
        Ok(decode_lossless(stored, coding.predictor, tile_width, tile_height))
    }
}

/// Decompressed interleaved RGB, with the predictor undone.
fn decode_lossless(
    mut data: Vec<u8>,
    predictor: u16,
    tile_width: u32,
    tile_height: u32,
) -> DecodedTile {
    if predictor == PREDICTOR_HORIZONTAL {
        undo_horizontal_predictor(&mut data, tile_width as usize * CHANNELS, CHANNELS);
    }
    decode_raw(&data, tile_width, tile_height)
}

/// Interleaved RGB as stored. A short tile keeps only its complete rows.
fn decode_raw(data: &[u8], tile_width: u32, tile_height: u32) -> DecodedTile {
    let row_bytes = tile_width as usize * CHANNELS;
    let rows = if row_bytes == 0 {
        0
    } else {
        (data.len() / row_bytes).min(tile_height as usize)
    };
    DecodedTile {
        width: tile_width,
        height: rows as u32,
        layout: TileLayout::HeightFirst,
        data: data[..rows * row_bytes].to_vec(),
    }
}

fn decode_jpeg(data: &[u8], jpeg_tables: Option<&[u8]>) -> Result<DecodedTile, SampleError> {
    let stream = prepare_tile_jpeg(jpeg_tables, data);
    let image = ImageReader::with_format(Cursor::new(&stream[..]), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| SampleError::Decode {
            message: format!("JPEG: {}", e),
        })?
        .into_rgb8();

    let (width, height) = image.dimensions();
    Ok(DecodedTile {
        width,
        height,
        layout: TileLayout::HeightFirst,
        data: image.into_raw(),
    })
}

fn decode_jpeg2000(data: &[u8]) -> Result<DecodedTile, SampleError> {
    let image = jpeg2k::Image::from_bytes(data).map_err(|e| SampleError::Decode {
        message: format!("JPEG 2000: {}", e),
    })?;

    let components = image.components();
    if components.len() < CHANNELS {
        return Err(SampleError::Decode {
            message: format!(
                "JPEG 2000: expected {} components, found {}",
                CHANNELS,
                components.len()
            ),
        });
    }

    let (width, height) = (components[0].width(), components[0].height());
    let planes: Vec<&[i32]> = components[..CHANNELS]
        .iter()
        .map(|component| {
            if component.width() != width || component.height() != height {
                return Err(SampleError::Decode {
                    message: "JPEG 2000: subsampled components are not supported".to_string(),
                });
            }
            Ok(component.data())
        })
        .collect::<Result<_, _>>()?;

    Ok(DecodedTile {
        width,
        height,
        layout: TileLayout::ChannelFirst,
        data: components_to_planar(&planes, width as usize * height as usize),
    })
}

/// Concatenate component planes, narrowing samples to `u8`.
///
/// Each plane contributes exactly `plane_len` samples; missing samples are 0.
fn components_to_planar(planes: &[&[i32]], plane_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; planes.len() * plane_len];
    for (plane, dst) in planes.iter().zip(out.chunks_exact_mut(plane_len.max(1))) {
        for (value, byte) in plane.iter().zip(dst.iter_mut()) {
            *byte = (*value).clamp(0, 255) as u8;
        }
    }
    out
}
