use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::IoError;
use crate::io::LocalFileReader;

use super::SlideSource;

/// Slides on the local filesystem.
///
/// Slide identifiers are paths. Relative identifiers are resolved against
/// `root` when one is set, and against the working directory otherwise.
#[derive(Debug, Clone, Default)]
pub struct LocalSlideSource {
    root: Option<PathBuf>,
}

impl LocalSlideSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, slide_id: &str) -> PathBuf {
        let path = Path::new(slide_id);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Reader = LocalFileReader;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError> {
        LocalFileReader::open(self.resolve(slide_id)).await
    }
}
