use serde::Serialize;

use crate::format::tiff::Compression;

/// Samples per pixel of every sampled tile.
pub const CHANNELS: usize = 3;

/// Memory order of a sampled tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TileLayout {
    /// Rows of interleaved RGB pixels, `(row * L + col) * 3 + channel`
    HeightFirst,

    /// One plane per channel, `channel * L * L + row * L + col`
    ChannelFirst,
}

impl TileLayout {
    /// Tag stored in the C descriptor's `first_dim`.
    pub const fn as_char(self) -> char {
        match self {
            TileLayout::HeightFirst => 'H',
            TileLayout::ChannelFirst => 'C',
        }
    }

    pub const fn from_char(tag: char) -> Option<Self> {
        match tag {
            'H' => Some(TileLayout::HeightFirst),
            'C' => Some(TileLayout::ChannelFirst),
            _ => None,
        }
    }

    /// JPEG 2000 decodes to component planes, every other codec to
    /// interleaved pixels.
    pub const fn for_compression(compression: Compression) -> Self {
        if compression.is_jpeg2000() {
            TileLayout::ChannelFirst
        } else {
            TileLayout::HeightFirst
        }
    }

    /// Offset of a sample in a square buffer of side `side`.
    #[inline]
    pub const fn index(self, side: usize, channel: usize, row: usize, col: usize) -> usize {
        match self {
            TileLayout::HeightFirst => (row * side + col) * CHANNELS + channel,
            TileLayout::ChannelFirst => channel * side * side + row * side + col,
        }
    }
}
