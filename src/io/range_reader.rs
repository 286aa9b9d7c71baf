use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random access to the bytes of a slide.
///
/// The TIFF parser and the tile decoders only ever ask for byte ranges, so a
/// slide can live on local disk or in object storage without being read in
/// full. Implementations must be shareable across tasks.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with `IoError::RangeOutOfBounds` when the range extends past
    /// the end of the resource.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Stable name of the resource, used in logs and cache keys.
    ///
    /// Local files use their path, S3 objects use `s3://bucket/key`.
    fn identifier(&self) -> &str;
}

/// Check that `offset..offset + len` lies inside a resource of `size` bytes.
#[inline]
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}
