//! Lossless TIFF codecs: LZW, Deflate and PackBits.
//!
//! Each returns the stored bytes of a tile, interleaved samples in row order,
//! before any predictor is undone.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::SampleError;

const CLEAR_CODE: u16 = 256;
const EOI_CODE: u16 = 257;
const MAX_CODE_BITS: u8 = 12;
const MAX_TABLE: usize = 1 << MAX_CODE_BITS;

fn lzw_error(message: impl Into<String>) -> SampleError {
    SampleError::Decode {
        message: format!("LZW: {}", message.into()),
    }
}

/// TIFF LZW: MSB-first codes of 9 to 12 bits.
///
/// Code widths grow one code early, as libtiff writes them: the width
/// increases once the table holds `2^bits - 1` entries.
pub fn decompress_lzw(data: &[u8], expected_len: usize) -> Result<Vec<u8>, SampleError> {
    let mut output = Vec::with_capacity(expected_len);
    let mut table: Vec<Vec<u8>> = Vec::with_capacity(MAX_TABLE);
    reset_table(&mut table);

    let mut bits = BitReader::new(data);
    let mut code_size = 9u8;
    let mut prev_code: Option<u16> = None;

    while let Some(code) = bits.read(code_size) {
        if code == EOI_CODE {
            break;
        }
        if code == CLEAR_CODE {
            reset_table(&mut table);
            code_size = 9;
            prev_code = None;
            continue;
        }

        let index = code as usize;
        let entry = match prev_code {
            _ if index < table.len() => table[index].clone(),
            Some(prev) if index == table.len() => {
                let mut entry = table[prev as usize].clone();
                entry.push(entry[0]);
                entry
            }
            _ => {
                return Err(lzw_error(format!(
                    "code {} out of range (table size {})",
                    code,
                    table.len()
                )));
            }
        };
        output.extend_from_slice(&entry);

        if let Some(prev) = prev_code {
            if table.len() < MAX_TABLE {
                let mut grown = table[prev as usize].clone();
                grown.push(entry[0]);
                table.push(grown);
            }
            if table.len() + 1 == 1 << code_size && code_size < MAX_CODE_BITS {
                code_size += 1;
            }
        }
        prev_code = Some(code);
    }

    Ok(output)
}

fn reset_table(table: &mut Vec<Vec<u8>>) {
    table.clear();
    table.extend((0..=255u8).map(|b| vec![b]));
    // Clear and end-of-information have no strings
    table.push(Vec::new());
    table.push(Vec::new());
}

struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read(&mut self, count: u8) -> Option<u16> {
        let mut result: u32 = 0;
        let mut read = 0u8;
        while read < count {
            let byte = *self.data.get(self.byte_pos)?;
            let available = 8 - self.bit_pos;
            let take = available.min(count - read);
            let shift = available - take;
            let bits = (byte >> shift) & ((1u16 << take) - 1) as u8;

            result = (result << take) | u32::from(bits);
            read += take;
            self.bit_pos += take;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }
        Some(result as u16)
    }
}

/// zlib-wrapped Deflate (compression 8 and 32946).
pub fn decompress_deflate(data: &[u8], expected_len: usize) -> Result<Vec<u8>, SampleError> {
    let mut output = Vec::with_capacity(expected_len);
    ZlibDecoder::new(data)
        .read_to_end(&mut output)
        .map_err(|e| SampleError::Decode {
            message: format!("Deflate: {}", e),
        })?;
    Ok(output)
}

/// PackBits run-length coding. A run cut short by the end of the data ends
/// the output.
pub fn decompress_packbits(data: &[u8], expected_len: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < data.len() {
        let header = data[i] as i8;
        i += 1;
        match header {
            0..=127 => {
                let end = (i + header as usize + 1).min(data.len());
                output.extend_from_slice(&data[i..end]);
                i = end;
            }
            -127..=-1 => {
                let Some(&value) = data.get(i) else {
                    break;
                };
                output.resize(output.len() + (1 - header as isize) as usize, value);
                i += 1;
            }
            // -128 is a no-op
            _ => {}
        }
    }
    output
}

/// Undo TIFF horizontal differencing (Predictor 2) on 8-bit samples.
pub fn undo_horizontal_predictor(data: &mut [u8], row_bytes: usize, samples: usize) {
    if row_bytes == 0 {
        return;
    }
    for row in data.chunks_mut(row_bytes) {
        for i in samples..row.len() {
            row[i] = row[i].wrapping_add(row[i - samples]);
        }
    }
}
