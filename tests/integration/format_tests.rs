//! Slide format integration tests.
//!
//! Tests verify:
//! - Aperio and generic TIFF detection
//! - Byte order and BigTIFF handling give identical slides
//! - Shared JPEGTables are found and merged into abbreviated tiles
//! - Label, macro and mask images stay out of the pyramid
//! - Files that are not TIFFs are rejected

use tiff_sampler::error::FormatError;
use tiff_sampler::format::jpeg::{classify_stream, StreamKind};
use tiff_sampler::format::tiff::{ByteOrder, TiffPyramid};
use tiff_sampler::format::{detect_format, is_tiff_header, prepare_tile_jpeg, SlideFormat};
use tiff_sampler::slide::Slide;
use tiff_sampler::tile::{SampleRequest, TileSampler};

use super::test_utils::{
    close_to, is_bigtiff_magic, is_valid_jpeg, pixel, tile_color, AssociatedImage, ByteOrderType,
    MockSlideSource, PyramidTiffBuilder, TileCodec, TrackingMockReader,
};

fn reader(data: Vec<u8>) -> TrackingMockReader {
    TrackingMockReader::new(data, "mock://slide.svs")
}

// =============================================================================
// Format Detection
// =============================================================================

#[tokio::test]
async fn test_detect_aperio() {
    let data = PyramidTiffBuilder::new().build();
    assert!(is_tiff_header(&data));
    assert_eq!(detect_format(&reader(data)).await.unwrap(), SlideFormat::AperioSvs);
}

#[tokio::test]
async fn test_detect_generic_tiff() {
    let plain = PyramidTiffBuilder::new().description(None).build();
    assert_eq!(
        detect_format(&reader(plain)).await.unwrap(),
        SlideFormat::GenericTiff
    );

    let other_vendor = PyramidTiffBuilder::new()
        .description(Some("Converted by a pyramid writer"))
        .build();
    assert_eq!(
        detect_format(&reader(other_vendor)).await.unwrap(),
        SlideFormat::GenericTiff
    );
}

#[tokio::test]
async fn test_detect_rejects_non_tiff() {
    let png_magic = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    assert!(!is_tiff_header(&png_magic));
    assert!(matches!(
        detect_format(&reader(png_magic)).await,
        Err(FormatError::UnsupportedFormat { .. })
    ));

    assert!(matches!(
        detect_format(&reader(vec![b'I', b'I'])).await,
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

// =============================================================================
// Byte Order and BigTIFF
// =============================================================================

#[tokio::test]
async fn test_header_variants() {
    let big_endian = PyramidTiffBuilder::new()
        .with_byte_order(ByteOrderType::BigEndian)
        .build();
    assert_eq!(&big_endian[..4], &[b'M', b'M', 0, 42]);
    assert!(is_tiff_header(&big_endian));

    let bigtiff = PyramidTiffBuilder::new().with_bigtiff(true).build();
    assert!(is_bigtiff_magic(&bigtiff));
    assert!(is_tiff_header(&bigtiff));

    let pyramid = TiffPyramid::parse(&reader(big_endian)).await.unwrap();
    assert_eq!(pyramid.header.byte_order, ByteOrder::BigEndian);
    assert!(!pyramid.header.is_bigtiff);

    let pyramid = TiffPyramid::parse(&reader(bigtiff)).await.unwrap();
    assert!(pyramid.header.is_bigtiff);
    assert_eq!(pyramid.levels.len(), 3);
}

#[tokio::test]
async fn test_layouts_open_to_the_same_slide() {
    let variants = [
        (ByteOrderType::LittleEndian, false),
        (ByteOrderType::BigEndian, false),
        (ByteOrderType::LittleEndian, true),
        (ByteOrderType::BigEndian, true),
    ];

    let mut opened = Vec::new();
    for (order, bigtiff) in variants {
        let data = PyramidTiffBuilder::new()
            .with_byte_order(order)
            .with_bigtiff(bigtiff)
            .build();
        let slide = Slide::open(&reader(data)).await.unwrap();
        assert_eq!(slide.format(), SlideFormat::AperioSvs, "{:?} bigtiff={}", order, bigtiff);
        assert_eq!(slide.app_mag(), Some(40.0));
        opened.push(slide.levels());
    }

    for levels in &opened[1..] {
        assert_eq!(levels, &opened[0]);
    }
    let dims: Vec<_> = opened[0].iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(dims, vec![(2048, 1024), (1024, 512), (512, 256)]);
}

#[tokio::test]
async fn test_associated_images_are_not_levels() {
    for order in [ByteOrderType::LittleEndian, ByteOrderType::BigEndian] {
        // Each would sit between two levels if it were taken as one
        let data = PyramidTiffBuilder::new()
            .with_byte_order(order)
            .associated_image(AssociatedImage::Label, 1500, 600)
            .associated_image(AssociatedImage::Macro, 800, 300)
            .associated_image(AssociatedImage::Mask, 700, 350)
            .build();

        let pyramid = TiffPyramid::parse(&reader(data.clone())).await.unwrap();
        let levels: Vec<_> = pyramid
            .levels
            .iter()
            .map(|l| (l.width, l.downsample))
            .collect();
        assert_eq!(levels, vec![(2048, 1.0), (1024, 2.0), (512, 4.0)], "{:?}", order);

        let source = MockSlideSource::new().with_slide("slide.svs", data);
        let sampler = TileSampler::new(source);
        let request = SampleRequest::new("slide.svs", 1000, 400, 64, 20);
        let tile = sampler.sample(&request).await.unwrap();
        assert_eq!(tile.pixel(3, 5), pixel(1, 505, 203));
    }
}

#[tokio::test]
async fn test_layouts_sample_identically() {
    let source = MockSlideSource::new()
        .with_slide("le.tif", PyramidTiffBuilder::new().build())
        .with_slide(
            "be.tif",
            PyramidTiffBuilder::new()
                .with_byte_order(ByteOrderType::BigEndian)
                .build(),
        )
        .with_slide(
            "big.tif",
            PyramidTiffBuilder::new()
                .with_byte_order(ByteOrderType::BigEndian)
                .with_bigtiff(true)
                .build(),
        );
    let sampler = TileSampler::new(source);

    let mut tiles = Vec::new();
    for slide in ["le.tif", "be.tif", "big.tif"] {
        let request = SampleRequest::new(slide, 700, 300, 128, 20);
        tiles.push(sampler.sample(&request).await.unwrap());
    }

    assert_eq!(tiles[0].pixel(0, 0), pixel(1, 350, 150));
    assert_eq!(tiles[1], tiles[0]);
    assert_eq!(tiles[2], tiles[0]);
}

// =============================================================================
// JPEG Tiles
// =============================================================================

#[tokio::test]
async fn test_shared_jpeg_tables() {
    let data = PyramidTiffBuilder::new()
        .codec(TileCodec::JpegWithTables)
        .build();
    let reader = reader(data);
    let slide = Slide::open(&reader).await.unwrap();

    assert_eq!(slide.level(0).unwrap().compression, 7);
    let tables = slide
        .tile_data(0)
        .and_then(|data| data.jpeg_tables.clone())
        .expect("JPEGTables should be loaded");
    assert!(is_valid_jpeg(&tables));

    let raw = slide.read_raw_tile(&reader, 0, 2, 1).await.unwrap();
    assert_eq!(classify_stream(&raw), StreamKind::Abbreviated);

    // The tile alone has no tables; merged it decodes to its colour
    let merged = prepare_tile_jpeg(Some(&tables[..]), &raw);
    assert_eq!(classify_stream(&merged), StreamKind::Complete);
    let image = image::load_from_memory(&merged).unwrap().into_rgb8();
    assert_eq!(image.dimensions(), (128, 128));
    assert!(close_to(image.get_pixel(64, 64).0, tile_color(0, 2, 1), 6));
}

#[tokio::test]
async fn test_complete_jpeg_tiles_have_no_tables() {
    let data = PyramidTiffBuilder::new().codec(TileCodec::Jpeg).build();
    let reader = reader(data);
    let slide = Slide::open(&reader).await.unwrap();

    assert!(slide.tile_data(1).unwrap().jpeg_tables.is_none());
    let raw = slide.read_raw_tile(&reader, 1, 0, 0).await.unwrap();
    assert!(is_valid_jpeg(&raw));
    assert_eq!(classify_stream(&raw), StreamKind::Complete);
    // Nothing to merge: the stream is returned unchanged
    assert_eq!(&prepare_tile_jpeg(None, &raw)[..], &raw[..]);
}

// =============================================================================
// Rejected Files
// =============================================================================

#[tokio::test]
async fn test_open_rejects_non_tiff() {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.resize(64, 0);
    assert!(matches!(
        Slide::open(&reader(data)).await,
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

#[tokio::test]
async fn test_open_rejects_truncated_file() {
    let mut data = PyramidTiffBuilder::new().build();
    // The IFDs are written last
    data.truncate(data.len() - 200);
    assert!(Slide::open(&reader(data)).await.is_err());
}

#[tokio::test]
async fn test_sparse_tile_reads_empty() {
    let data = PyramidTiffBuilder::new().sparse_tile(2, 1, 1).build();
    let reader = reader(data);
    let slide = Slide::open(&reader).await.unwrap();

    let raw = slide.read_raw_tile(&reader, 2, 1, 1).await.unwrap();
    assert!(raw.is_empty());
    let raw = slide.read_raw_tile(&reader, 2, 0, 1).await.unwrap();
    assert_eq!(raw.len(), 128 * 128 * 3);
}
