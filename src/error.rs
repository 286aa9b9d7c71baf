use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Error from the local filesystem
    #[error("Local I/O error: {0}")]
    Local(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object or file not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Errors related to format detection and validation
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (supported: none, JPEG, JPEG 2000)")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors that can occur while sampling a tile from a slide.
///
/// Every failure of `load_single_tile` maps to one of these variants; the
/// C ABI surfaces the `Display` text through its last-error slot.
#[derive(Debug, Clone, Error)]
pub enum SampleError {
    /// The slide does not exist
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: String },

    /// The slide carries no AppMag entry and no fallback was configured
    #[error("AppMag not found in image description of {slide_id}")]
    MissingAppMag { slide_id: String },

    /// Requested magnification is not usable
    #[error("Invalid magnification: {magnification}")]
    InvalidMagnification { magnification: u8 },

    /// Requested tile size is not usable
    #[error("Invalid tile size: {tile_size}")]
    InvalidTileSize { tile_size: u16 },

    /// The region needed at the selected level does not fit a u16 side
    #[error("Output side of {size} pixels does not fit the tile descriptor")]
    OutputTooLarge { size: f64 },

    /// The slide has no tiled pyramid level
    #[error("No pyramid levels found in {slide_id}")]
    NoPyramidLevels { slide_id: String },

    /// The level does not store 8-bit contiguous RGB
    #[error("Unsupported sample format at level {level}: {message}")]
    UnsupportedSampleFormat { level: usize, message: String },

    /// The level uses a codec we cannot decode
    #[error("Unsupported compression {compression} at level {level}")]
    UnsupportedCompression { level: usize, compression: u16 },

    /// Region origin lies outside the selected level
    #[error(
        "Coordinates ({x}, {y}) out of bounds for level {level} ({width}x{height} at downsample {downsample})"
    )]
    OutOfBounds {
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
        downsample: f64,
    },

    /// Tile payload could not be decoded
    #[error("Failed to decode tile: {message}")]
    Decode { message: String },

    /// Output could not be written
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Buffer does not match the declared tile geometry
    #[error("Tile buffer has {actual} bytes, expected {expected}")]
    InvalidBuffer { expected: usize, actual: usize },

    /// I/O error while reading the slide
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Slide structure could not be parsed
    #[error("Slide error: {0}")]
    Slide(#[from] TiffError),

    /// Slide format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// A sampling task panicked or was cancelled
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SampleError {
    /// Map a slide-open failure, turning missing objects into `SlideNotFound`.
    pub fn from_format(error: FormatError, slide_id: &str) -> Self {
        match error {
            FormatError::Io(IoError::NotFound(_)) => SampleError::SlideNotFound {
                slide_id: slide_id.to_string(),
            },
            FormatError::Io(io_err) => SampleError::Io(io_err),
            FormatError::Tiff(TiffError::Io(IoError::NotFound(_))) => SampleError::SlideNotFound {
                slide_id: slide_id.to_string(),
            },
            FormatError::Tiff(tiff_err) => SampleError::Slide(tiff_err),
            FormatError::UnsupportedFormat { reason } => SampleError::UnsupportedFormat { reason },
        }
    }
}
