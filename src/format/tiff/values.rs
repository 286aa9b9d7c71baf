//! Reading IFD entry values.
//!
//! Small values live inside the entry, larger ones (tile tables, JPEG tables,
//! the image description) at an offset in the file. Arrays are fetched with a
//! single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads entry values through a [`RangeReader`] using the file's byte order.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "entry",
            message: format!("value of {} bytes is too large", size),
        })?;
        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size).await?)
    }

    /// A single integer value.
    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }
        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: "entry",
                message: format!("expected count 1, got {}", entry.count),
            });
        }
        let values = self.read_u32_array(entry).await?;
        values.first().copied().ok_or(TiffError::InvalidTagValue {
            tag: "entry",
            message: "empty value".to_string(),
        })
    }

    /// An integer array widened to u64 (TileOffsets, TileByteCounts).
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.read_bytes(entry).await?;
        decode_integers(&bytes, entry.count as usize, field_type, self.byte_order())
    }

    /// An integer array of at most 32-bit values (BitsPerSample).
    pub async fn read_u32_array(&self, entry: &IfdEntry) -> Result<Vec<u32>, TiffError> {
        if entry.field_type == Some(FieldType::Long8) {
            return Err(TiffError::InvalidTagValue {
                tag: "entry",
                message: "expected Byte, Short or Long, got Long8".to_string(),
            });
        }
        Ok(self
            .read_u64_array(entry)
            .await?
            .into_iter()
            .map(|v| v as u32)
            .collect())
    }

    /// An ASCII value, cut at the first NUL.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        match entry.field_type {
            Some(FieldType::Ascii) => {}
            Some(other) => {
                return Err(TiffError::InvalidTagValue {
                    tag: "entry",
                    message: format!("expected Ascii type for string, got {:?}", other),
                })
            }
            None => return Err(TiffError::UnknownFieldType(entry.field_type_raw)),
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Opaque bytes such as JPEGTables.
    pub async fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        self.read_bytes(entry).await
    }
}

/// Decode `count` integers of `field_type` from `bytes`.
pub fn decode_integers(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Result<Vec<u64>, TiffError> {
    let width = field_type.size_in_bytes();
    let needed = width * count;
    if bytes.len() < needed {
        return Err(TiffError::InvalidTagValue {
            tag: "entry",
            message: format!("expected {} bytes of values, got {}", needed, bytes.len()),
        });
    }

    let read: fn(ByteOrder, &[u8]) -> u64 = match field_type {
        FieldType::Byte | FieldType::Undefined => |_, b| b[0] as u64,
        FieldType::Short => |bo, b| bo.read_u16(b) as u64,
        FieldType::Long => |bo, b| bo.read_u32(b) as u64,
        FieldType::Long8 => |bo, b| bo.read_u64(b),
        FieldType::Ascii => {
            return Err(TiffError::InvalidTagValue {
                tag: "entry",
                message: "expected an integer type, got Ascii".to_string(),
            })
        }
    };

    Ok(bytes[..needed]
        .chunks_exact(width)
        .map(|chunk| read(byte_order, chunk))
        .collect())
}

// =============================================================================
// Tests
// =============================================================================
