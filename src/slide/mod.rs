//! Slides and where they come from.
//!
//! ```text
//!   SlideRegistry ── LRU of CachedSlide (Slide + BlockCache<reader>)
//!        │
//!   SlideSource ──── LocalSlideSource (paths) / S3SlideSource (object keys)
//! ```

mod local_source;
mod reader;
mod registry;
mod s3_source;

pub use local_source::LocalSlideSource;
pub use reader::{LevelInfo, Slide};
pub use registry::{CachedSlide, SlideRegistry, SlideSource, DEFAULT_SLIDE_CACHE_CAPACITY};
pub use s3_source::S3SlideSource;
