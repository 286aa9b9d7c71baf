//! End-to-end sampling tests.
//!
//! Tests verify:
//! - Level selection and output size across a three level pyramid
//! - Pixel values against the pattern the slide was written with
//! - Padding where the region leaves the slide or a tile is sparse
//! - Pyramids with small levels and non power-of-two steps
//! - Raw, JPEG, abbreviated JPEG, lossless and JPEG 2000 tiles
//! - Channel-first conversion, resize and image output
//! - Error reporting for bad requests

use std::sync::Arc;

use tiff_sampler::error::SampleError;
use tiff_sampler::tile::{SampleRequest, SamplerOptions, TileLayout, TileSampler};

use super::test_utils::{
    close_to, j2k_pixel, pixel, temp_path, tile_color, MockSlideSource, PyramidTiffBuilder,
    TileCodec,
};

/// A sampler over one raw slide registered as `slide.svs`.
fn raw_sampler() -> TileSampler<MockSlideSource> {
    let source = MockSlideSource::new().with_slide("slide.svs", PyramidTiffBuilder::new().build());
    TileSampler::new(source)
}

fn request(x: u64, y: u64, tile_size: u16, magnification: u8) -> SampleRequest {
    SampleRequest::new("slide.svs", x, y, tile_size, magnification)
}

fn sampler_for(data: Vec<u8>) -> TileSampler<MockSlideSource> {
    TileSampler::new(MockSlideSource::new().with_slide("slide.svs", data))
}

// =============================================================================
// Level Selection
// =============================================================================

#[tokio::test]
async fn test_plan_per_magnification() {
    let sampler = raw_sampler();

    // (magnification, level, downsample, output side)
    let cases = [
        (40, 0, 1.0, 256),
        (20, 1, 2.0, 256),
        (10, 2, 4.0, 256),
        // Coarser than every level: the coarsest level, read larger
        (5, 2, 4.0, 512),
        // Finer than the base: the base, read smaller
        (80, 0, 1.0, 128),
    ];

    for (magnification, level, downsample, side) in cases {
        let plan = sampler
            .plan(&request(0, 0, 256, magnification))
            .await
            .unwrap();
        assert_eq!(plan.level, level, "level at {}x", magnification);
        assert!((plan.downsample - downsample).abs() < 1e-9);
        assert_eq!(plan.img_size, side, "output side at {}x", magnification);
        assert_eq!(plan.app_mag, 40.0);
    }
}

#[tokio::test]
async fn test_plan_origin_in_level_pixels() {
    let sampler = raw_sampler();
    let plan = sampler.plan(&request(1001, 403, 256, 20)).await.unwrap();

    assert_eq!(plan.level, 1);
    assert_eq!((plan.origin_x, plan.origin_y), (500, 201));
    assert_eq!((plan.first_tile_x, plan.first_tile_y), (3, 1));
    assert_eq!((plan.crop_left, plan.crop_top), (116, 73));
}

#[tokio::test]
async fn test_sample_matches_selected_level() {
    let sampler = raw_sampler();
    let tile = sampler.sample(&request(1000, 400, 256, 20)).await.unwrap();

    assert_eq!(tile.tile_length(), 256);
    assert_eq!(tile.layout(), TileLayout::HeightFirst);
    assert_eq!(tile.data().len(), 256 * 256 * 3);

    // Level 1 pixels starting at (500, 200), across several source tiles
    for (row, col) in [(0, 0), (0, 255), (255, 0), (255, 255), (27, 12), (100, 140)] {
        assert_eq!(
            tile.pixel(row, col),
            pixel(1, 500 + col as u32, 200 + row as u32),
            "pixel ({}, {})",
            row,
            col
        );
    }
}

#[tokio::test]
async fn test_sample_upsampled_region_is_smaller() {
    let sampler = raw_sampler();
    let tile = sampler.sample(&request(256, 128, 256, 80)).await.unwrap();

    assert_eq!(tile.tile_length(), 128);
    assert_eq!(tile.pixel(0, 0), pixel(0, 256, 128));
    assert_eq!(tile.pixel(127, 127), pixel(0, 383, 255));
}

#[tokio::test]
async fn test_sample_below_every_level() {
    let sampler = raw_sampler();
    let tile = sampler.sample(&request(0, 0, 64, 5)).await.unwrap();

    // 64 * 40 / (4 * 5 - 0.01) = 128.06
    assert_eq!(tile.tile_length(), 128);
    assert_eq!(tile.pixel(77, 101), pixel(2, 101, 77));
}

#[tokio::test]
async fn test_small_levels_are_selectable() {
    // The coarsest level is smaller than one tile
    let data = PyramidTiffBuilder::new()
        .levels(vec![(1600, 1280), (400, 320), (100, 80)])
        .build();
    let sampler = sampler_for(data);

    let description = sampler.describe("slide.svs").await.unwrap();
    let downsamples: Vec<f64> = description.levels.iter().map(|l| l.downsample).collect();
    assert_eq!(downsamples, vec![1.0, 4.0, 16.0]);

    let plan = sampler.plan(&request(400, 800, 256, 10)).await.unwrap();
    assert_eq!(plan.level, 1);
    assert!((plan.downsample - 4.0).abs() < 1e-9);
    // 256 * 40 / (4 * 10 - 0.01) = 256.06
    assert_eq!(plan.img_size, 256);

    let tile = sampler.sample(&request(400, 800, 256, 10)).await.unwrap();
    assert_eq!(tile.pixel(0, 0), pixel(1, 100, 200));
    // Level 1 has 120 rows below y = 200
    assert_eq!(tile.pixel(119, 255), pixel(1, 355, 319));
    assert_eq!(tile.pixel(120, 0), [255, 255, 255]);

    let plan = sampler.plan(&request(0, 0, 64, 2)).await.unwrap();
    assert_eq!(plan.level, 2);
    assert!((plan.downsample - 16.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_three_times_pyramid() {
    let data = PyramidTiffBuilder::new()
        .levels(vec![(1536, 1536), (512, 512)])
        .build();
    let sampler = sampler_for(data);

    let plan = sampler.plan(&request(300, 600, 256, 13)).await.unwrap();
    assert_eq!(plan.level, 1);
    assert!((plan.downsample - 3.0).abs() < 1e-9);
    // 256 * 40 / (3 * 13 - 0.01) = 262.6
    assert_eq!(plan.img_size, 262);
    assert_eq!((plan.origin_x, plan.origin_y), (100, 200));

    let tile = sampler.sample(&request(300, 600, 256, 13)).await.unwrap();
    assert_eq!(tile.tile_length(), 262);
    assert_eq!(tile.pixel(0, 0), pixel(1, 100, 200));
    assert_eq!(tile.pixel(261, 261), pixel(1, 361, 461));
}

// =============================================================================
// Padding
// =============================================================================

#[tokio::test]
async fn test_region_past_slide_edge_is_padded() {
    let sampler = raw_sampler();
    let tile = sampler.sample(&request(1900, 900, 256, 40)).await.unwrap();

    // Level 0 is 2048x1024: 148 columns and 124 rows are inside
    assert_eq!(tile.pixel(0, 0), pixel(0, 1900, 900));
    assert_eq!(tile.pixel(123, 147), pixel(0, 2047, 1023));
    assert_eq!(tile.pixel(0, 148), [255, 255, 255]);
    assert_eq!(tile.pixel(124, 0), [255, 255, 255]);
    assert_eq!(tile.pixel(255, 255), [255, 255, 255]);
}

#[tokio::test]
async fn test_pad_value_is_configurable() {
    let source = MockSlideSource::new().with_slide("slide.svs", PyramidTiffBuilder::new().build());
    let options = SamplerOptions {
        pad_value: 0,
        ..SamplerOptions::default()
    };
    let sampler = TileSampler::with_options(source, options);

    let tile = sampler.sample(&request(2000, 0, 256, 40)).await.unwrap();
    assert_eq!(tile.pixel(5, 47), pixel(0, 2047, 5));
    assert_eq!(tile.pixel(5, 48), [0, 0, 0]);
}

#[tokio::test]
async fn test_sparse_tile_is_padded() {
    let data = PyramidTiffBuilder::new().sparse_tile(0, 1, 0).build();
    let source = MockSlideSource::new().with_slide("slide.svs", data);
    let sampler = TileSampler::new(source);

    let tile = sampler.sample(&request(64, 0, 256, 40)).await.unwrap();
    // Columns 0..64 come from tile (0, 0), 64..192 from the sparse tile (1, 0)
    assert_eq!(tile.pixel(10, 63), pixel(0, 127, 10));
    assert_eq!(tile.pixel(10, 64), [255, 255, 255]);
    assert_eq!(tile.pixel(10, 191), [255, 255, 255]);
    assert_eq!(tile.pixel(10, 192), pixel(0, 256, 10));
    // Row 128 is in tile row 1, which is stored
    assert_eq!(tile.pixel(128, 100), pixel(0, 164, 128));
}

// =============================================================================
// Codecs
// =============================================================================

async fn check_jpeg_slide(codec: TileCodec) {
    let data = PyramidTiffBuilder::new().codec(codec).build();
    let source = MockSlideSource::new().with_slide("slide.svs", data);
    let sampler = TileSampler::new(source);

    let tile = sampler.sample(&request(0, 0, 256, 20)).await.unwrap();
    assert_eq!(tile.tile_length(), 256);
    assert_eq!(tile.layout(), TileLayout::HeightFirst);

    // Level 1 tiles are 128 pixels; sample away from block edges
    let points = [(10, 10, 0, 0), (10, 200, 1, 0), (200, 60, 0, 1), (250, 250, 1, 1)];
    for (row, col, tile_x, tile_y) in points {
        let actual = tile.pixel(row, col);
        let expected = tile_color(1, tile_x, tile_y);
        assert!(
            close_to(actual, expected, 6),
            "pixel ({}, {}) is {:?}, expected about {:?}",
            row,
            col,
            actual,
            expected
        );
    }
}

#[tokio::test]
async fn test_sample_jpeg_slide() {
    check_jpeg_slide(TileCodec::Jpeg).await;
}

#[tokio::test]
async fn test_sample_jpeg_slide_with_shared_tables() {
    check_jpeg_slide(TileCodec::JpegWithTables).await;
}

async fn check_lossless_slide(codec: TileCodec, predictor: bool) {
    let data = PyramidTiffBuilder::new()
        .codec(codec)
        .predictor(predictor)
        .build();
    let sampler = sampler_for(data);
    let expected = raw_sampler()
        .sample(&request(1000, 400, 256, 20))
        .await
        .unwrap();

    let tile = sampler.sample(&request(1000, 400, 256, 20)).await.unwrap();
    assert_eq!(tile.layout(), TileLayout::HeightFirst);
    assert_eq!(tile.data(), expected.data(), "{:?} tiles", codec);
    assert_eq!(tile.pixel(27, 12), pixel(1, 512, 227));
}

#[tokio::test]
async fn test_sample_lzw_slide() {
    check_lossless_slide(TileCodec::Lzw, false).await;
    check_lossless_slide(TileCodec::Lzw, true).await;
}

#[tokio::test]
async fn test_sample_deflate_slide() {
    check_lossless_slide(TileCodec::Deflate, false).await;
    check_lossless_slide(TileCodec::Deflate, true).await;
}

#[tokio::test]
async fn test_sample_packbits_slide() {
    check_lossless_slide(TileCodec::PackBits, false).await;
    check_lossless_slide(TileCodec::PackBits, true).await;
}

async fn check_jpeg2000_slide(codec: TileCodec) {
    let data = PyramidTiffBuilder::new()
        .codec(codec)
        .tile_size(32)
        .build();
    let sampler = sampler_for(data);

    // Level 1 from (20, 10), crossing tile borders in both directions
    let tile = sampler.sample(&request(40, 20, 64, 20)).await.unwrap();
    assert_eq!(tile.tile_length(), 64);
    assert_eq!(tile.layout(), TileLayout::ChannelFirst);

    let plane = 64 * 64;
    for (row, col) in [(0, 0), (0, 11), (21, 12), (40, 50), (63, 63)] {
        let [r, g, b] = j2k_pixel(20 + col as u32, 10 + row as u32);
        let at = row * 64 + col;
        assert_eq!(
            [tile.data()[at], tile.data()[plane + at], tile.data()[2 * plane + at]],
            [r, g, b],
            "pixel ({}, {})",
            row,
            col
        );
    }

    // Both conversions agree with a height-first reading of the same pixels
    let tensor = tile.to_chw();
    assert_eq!(tensor.data(), tile.data());
    let image = tile.to_rgb_image();
    for (row, col) in [(5, 7), (33, 2), (63, 40)] {
        let expected = j2k_pixel(20 + col, 10 + row);
        assert_eq!(image.get_pixel(col, row).0, expected);
        assert_eq!(tile.pixel(row as usize, col as usize), expected);
    }
}

#[tokio::test]
async fn test_sample_jpeg2000_slide() {
    check_jpeg2000_slide(TileCodec::Jpeg2000).await;
}

#[tokio::test]
async fn test_sample_jpeg2000_ycbcr_slide() {
    check_jpeg2000_slide(TileCodec::Jpeg2000YCbCr).await;
}

// =============================================================================
// Tensor and Output
// =============================================================================

#[tokio::test]
async fn test_chw_resize_and_save() {
    let sampler = raw_sampler();
    // 128 * 40 / (4 * 5 - 0.01) = 256.1, all of it inside level 2
    let tile = sampler.sample(&request(0, 0, 128, 5)).await.unwrap();
    assert_eq!(tile.tile_length(), 256);

    let tensor = tile.to_chw();
    assert_eq!(tensor.shape(), [3, 256, 256]);
    let [r, g, b] = pixel(2, 30, 20);
    assert_eq!(tensor.get(0, 20, 30), Some(r));
    assert_eq!(tensor.get(1, 20, 30), Some(g));
    assert_eq!(tensor.get(2, 20, 30), Some(b));

    let resized = tensor.resize(128);
    assert_eq!(resized.shape(), [3, 128, 128]);
    // The blue channel is constant on the level and stays constant
    assert!(resized.data()[2 * 128 * 128..].iter().all(|&v| v == b));

    let path = temp_path("resized.png");
    resized.save(&path).unwrap();
    let written = image::open(&path).unwrap().into_rgb8();
    std::fs::remove_file(&path).ok();
    assert_eq!(written.dimensions(), (128, 128));
    assert_eq!(written.get_pixel(0, 0).0[2], b);
}

// =============================================================================
// Many Requests
// =============================================================================

#[tokio::test]
async fn test_sample_many_keeps_request_order() {
    let sampler = Arc::new(raw_sampler());
    let requests = vec![
        request(0, 0, 128, 40),
        request(4000, 0, 128, 40),
        request(512, 256, 128, 20),
        request(0, 0, 0, 40),
    ];

    let results = sampler.sample_many(requests).await;
    assert_eq!(results.len(), 4);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.pixel(3, 4), pixel(0, 4, 3));
    assert!(matches!(results[1], Err(SampleError::OutOfBounds { .. })));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.pixel(0, 0), pixel(1, 256, 128));
    assert!(matches!(results[3], Err(SampleError::InvalidTileSize { tile_size: 0 })));
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_missing_slide() {
    let sampler = raw_sampler();
    let err = sampler
        .sample(&SampleRequest::new("other.svs", 0, 0, 256, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, SampleError::SlideNotFound { ref slide_id } if slide_id == "other.svs"));
}

#[tokio::test]
async fn test_origin_outside_level() {
    let sampler = raw_sampler();

    let err = sampler.sample(&request(2048, 0, 256, 40)).await.unwrap_err();
    assert!(matches!(err, SampleError::OutOfBounds { level: 0, .. }));

    // 2040 / 2 = 1020 is inside level 1; 2050 / 2 = 1025 is not
    assert!(sampler.sample(&request(2040, 0, 256, 20)).await.is_ok());
    let err = sampler.sample(&request(2050, 0, 256, 20)).await.unwrap_err();
    assert!(matches!(err, SampleError::OutOfBounds { level: 1, .. }));
}

#[tokio::test]
async fn test_invalid_request_values() {
    let sampler = raw_sampler();

    let err = sampler.sample(&request(0, 0, 256, 0)).await.unwrap_err();
    assert!(matches!(err, SampleError::InvalidMagnification { magnification: 0 }));

    let err = sampler.sample(&request(0, 0, 0, 20)).await.unwrap_err();
    assert!(matches!(err, SampleError::InvalidTileSize { tile_size: 0 }));
}

#[tokio::test]
async fn test_output_side_overflow() {
    let sampler = raw_sampler();
    // 60000 * 40 / (4 * 1 - 0.01) is far beyond u16
    let err = sampler.sample(&request(0, 0, 60000, 1)).await.unwrap_err();
    assert!(matches!(err, SampleError::OutputTooLarge { .. }));
}

#[tokio::test]
async fn test_missing_magnification_uses_fallback() {
    let data = PyramidTiffBuilder::new().description(None).build();

    let source = MockSlideSource::new().with_slide("slide.svs", data.clone());
    let sampler = TileSampler::new(source);
    let err = sampler.sample(&request(0, 0, 256, 20)).await.unwrap_err();
    assert!(matches!(err, SampleError::MissingAppMag { .. }));

    let source = MockSlideSource::new().with_slide("slide.svs", data);
    let options = SamplerOptions {
        fallback_magnification: Some(40.0),
        ..SamplerOptions::default()
    };
    let sampler = TileSampler::with_options(source, options);
    let tile = sampler.sample(&request(600, 300, 256, 20)).await.unwrap();
    assert_eq!(tile.pixel(0, 0), pixel(1, 300, 150));
}

#[tokio::test]
async fn test_describe_slide() {
    let sampler = raw_sampler();
    let description = sampler.describe("slide.svs").await.unwrap();

    assert_eq!((description.width, description.height), (2048, 1024));
    assert_eq!(description.app_mag, Some(40.0));
    assert_eq!(description.mpp, Some(0.25));
    assert_eq!(description.levels.len(), 3);
    assert_eq!(description.levels[2].width, 512);
    assert!((description.levels[2].downsample - 4.0).abs() < 1e-9);

    let json = serde_json::to_value(&description).unwrap();
    assert_eq!(json["levels"].as_array().unwrap().len(), 3);
}
