use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Local filesystem implementation of RangeReader.
///
/// The file is opened once and its size taken from metadata. Reads seek the
/// shared handle, so they are serialized per file; callers wrap the reader in
/// a `BlockCache` to keep the number of reads low.
pub struct LocalFileReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` for ranged reads.
    ///
    /// A missing file yields `IoError::NotFound`; other failures are
    /// reported as `IoError::Local`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let identifier = path.display().to_string();

        let file = File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::Local(format!("{}: {}", identifier, e)),
        })?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| IoError::Local(format!("{}: {}", identifier, e)))?;

        if !metadata.is_file() {
            return Err(IoError::Local(format!("{}: not a regular file", identifier)));
        }

        Ok(Self {
            file: Mutex::new(file),
            path,
            size: metadata.len(),
            identifier,
        })
    }

    /// Path the reader was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;

        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::Local(format!("{}: {}", self.identifier, e)))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| IoError::Local(format!("{}: {}", self.identifier, e)))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
