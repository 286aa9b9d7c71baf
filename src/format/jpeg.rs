//! Abbreviated JPEG streams.
//!
//! Aperio and many tiled TIFF writers store the quantization (DQT) and
//! Huffman (DHT) tables once in the `JPEGTables` tag and leave them out of
//! every tile. Such a tile is not decodable alone; the tables have to be
//! spliced in front of its scan:
//!
//! ```text
//! tables: SOI DQT DHT EOI      tile: SOI SOF SOS <scan> EOI
//! merged: SOI DQT DHT SOF SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};

/// Start Of Image
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Quantization Table
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Define Huffman Table
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Start Of Scan
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// What the header segments of a stream contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Carries DQT or DHT before its scan
    Complete,
    /// Reaches SOS without any table
    Abbreviated,
    /// Not a JPEG stream, or truncated before the scan
    Unknown,
}

/// Walk the header segments of `data` up to the first scan.
pub fn classify_stream(data: &[u8]) -> StreamKind {
    if data.len() < 4 || data[..2] != SOI {
        return StreamKind::Unknown;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return StreamKind::Complete;
        }
        if marker == SOS {
            return StreamKind::Abbreviated;
        }

        // Fill bytes, stuffed zeros and standalone markers have no length
        let standalone = matches!(marker[1], 0x00 | 0x01 | 0xD0..=0xD9 | 0xFF);
        if standalone || pos + 3 >= data.len() {
            pos += if marker[1] == 0xFF { 1 } else { 2 };
            continue;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length.max(2);
    }

    StreamKind::Unknown
}

/// Splice `tables` into an abbreviated `tile`.
///
/// The EOI of the tables and the SOI of the tile are dropped so the result
/// has exactly one of each.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile);
    }
    if tile.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI).unwrap_or(tile);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Make a tile decodable, merging `tables` only when the tile lacks its own.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile: &[u8]) -> Bytes {
    match (classify_stream(tile), tables) {
        (StreamKind::Abbreviated, Some(tables)) => merge_jpeg_tables(tables, tile),
        _ => Bytes::copy_from_slice(tile),
    }
}
