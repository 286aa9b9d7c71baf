//! Channel-first image tensors.
//!
//! Sampled tiles are converted to a `(3, H, W)` tensor for model input. Pixel
//! work beyond reordering axes (resizing, file encoding) is done by `image`.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::SampleError;

use super::layout::CHANNELS;

/// A `(3, height, width)` tensor of `u8` samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTensor {
    height: u32,
    width: u32,
    data: Vec<u8>,
}

impl ImageTensor {
    /// Wrap planar data, checking its length against the shape.
    pub fn from_chw(height: u32, width: u32, data: Vec<u8>) -> Result<Self, SampleError> {
        let expected = CHANNELS * height as usize * width as usize;
        if data.len() != expected {
            return Err(SampleError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Wrap planar data whose length is already known to match.
    pub(crate) fn from_planes(height: u32, width: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), CHANNELS * height as usize * width as usize);
        Self {
            height,
            width,
            data,
        }
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let plane = width as usize * height as usize;
        let mut data = vec![0u8; CHANNELS * plane];
        for (i, pixel) in image.pixels().enumerate() {
            for (c, &value) in pixel.0.iter().enumerate() {
                data[c * plane + i] = value;
            }
        }
        Self {
            height,
            width,
            data,
        }
    }

    /// `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [CHANNELS, self.height as usize, self.width as usize]
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Sample at `(channel, row, col)`, `None` outside the tensor.
    pub fn get(&self, channel: usize, row: u32, col: u32) -> Option<u8> {
        if channel >= CHANNELS || row >= self.height || col >= self.width {
            return None;
        }
        let plane = self.height as usize * self.width as usize;
        self.data
            .get(channel * plane + row as usize * self.width as usize + col as usize)
            .copied()
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let plane = self.height as usize * self.width as usize;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let i = y as usize * self.width as usize + x as usize;
            Rgb([
                self.data[i],
                self.data[plane + i],
                self.data[2 * plane + i],
            ])
        })
    }

    /// Bilinear resize to `size` x `size`.
    pub fn resize(&self, size: u32) -> ImageTensor {
        if self.width == size && self.height == size {
            return self.clone();
        }
        let resized = imageops::resize(&self.to_rgb_image(), size, size, FilterType::Triangle);
        Self::from_rgb_image(&resized)
    }

    /// Write the tensor as an image, format chosen from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SampleError> {
        let path = path.as_ref();
        self.to_rgb_image()
            .save(path)
            .map_err(|e| SampleError::Encode {
                message: format!("{}: {}", path.display(), e),
            })
    }
}
