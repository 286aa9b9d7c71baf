//! Byte-range access to slide files.
//!
//! Everything above this module reads slides through [`RangeReader`]:
//! [`LocalFileReader`] for paths on disk, [`S3RangeReader`] for objects in
//! S3-compatible storage, and [`BlockCache`] wrapping either of them.

mod block_cache;
mod file_reader;
mod range_reader;
mod s3_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use file_reader::LocalFileReader;
pub(crate) use range_reader::check_range;
pub use range_reader::RangeReader;
pub use s3_reader::{create_s3_client, S3RangeReader};
