use image::{Rgb, RgbImage};

use crate::error::SampleError;

use super::layout::{TileLayout, CHANNELS};
use super::tensor::ImageTensor;

/// Bytes in a square RGB tile of side `tile_length`.
#[inline]
pub const fn tile_byte_len(tile_length: u16) -> usize {
    tile_length as usize * tile_length as usize * CHANNELS
}

/// A sampled square RGB region.
///
/// The buffer always holds `tile_length * tile_length * 3` bytes in the
/// order given by `layout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    data: Vec<u8>,
    tile_length: u16,
    layout: TileLayout,
}

impl Tile {
    pub fn new(data: Vec<u8>, tile_length: u16, layout: TileLayout) -> Result<Self, SampleError> {
        let expected = tile_byte_len(tile_length);
        if data.len() != expected {
            return Err(SampleError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            tile_length,
            layout,
        })
    }

    /// A tile where every sample is `value`.
    pub fn filled(tile_length: u16, layout: TileLayout, value: u8) -> Self {
        Self {
            data: vec![value; tile_byte_len(tile_length)],
            tile_length,
            layout,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn tile_length(&self) -> u16 {
        self.tile_length
    }

    pub fn layout(&self) -> TileLayout {
        self.layout
    }

    /// RGB value at `(row, col)`.
    ///
    /// # Panics
    ///
    /// If `row` or `col` is not below `tile_length`.
    pub fn pixel(&self, row: usize, col: usize) -> [u8; 3] {
        let side = self.tile_length as usize;
        assert!(row < side && col < side, "pixel ({row}, {col}) outside {side}x{side} tile");
        [0, 1, 2].map(|c| self.data[self.layout.index(side, c, row, col)])
    }

    /// The tile as a `(3, L, L)` tensor.
    ///
    /// Height-first buffers are read as `(L, L, 3)` and their channel axis is
    /// moved to the front; channel-first buffers already have that shape.
    pub fn to_chw(&self) -> ImageTensor {
        let side = self.tile_length as u32;
        let data = match self.layout {
            TileLayout::ChannelFirst => self.data.clone(),
            TileLayout::HeightFirst => {
                let plane = side as usize * side as usize;
                let mut planar = vec![0u8; self.data.len()];
                for (i, pixel) in self.data.chunks_exact(CHANNELS).enumerate() {
                    for (c, &value) in pixel.iter().enumerate() {
                        planar[c * plane + i] = value;
                    }
                }
                planar
            }
        };
        ImageTensor::from_planes(side, side, data)
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let side = self.tile_length as u32;
        RgbImage::from_fn(side, side, |x, y| Rgb(self.pixel(y as usize, x as usize)))
    }
}
