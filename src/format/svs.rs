//! Aperio ImageDescription metadata.
//!
//! Aperio writers put a banner line followed by pipe-separated `key = value`
//! pairs into the ImageDescription of the base image:
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499
//! ```
//!
//! `AppMag`, the magnification the slide was scanned at, is what the sampler
//! needs to turn a requested magnification into a pyramid downsample.

use std::collections::HashMap;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::tiff::{Ifd, TiffHeader, TiffTag, ValueReader};

/// Parsed ImageDescription.
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Scan magnification (`AppMag`), `None` when absent or not positive
    pub app_mag: Option<f64>,

    /// Microns per pixel at the base level
    pub mpp: Option<f64>,

    pub vendor: Option<String>,

    pub image_description: Option<String>,

    /// Every `key = value` pair; for duplicate keys the last one wins
    pub properties: HashMap<String, String>,
}

impl SvsMetadata {
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: Some(description.to_string()),
            vendor: description.contains("Aperio").then(|| "Aperio".to_string()),
            ..Default::default()
        };

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            metadata
                .properties
                .insert(key.to_string(), value.to_string());

            if key == "MPP" {
                metadata.mpp = value.parse::<f64>().ok().filter(|v| *v > 0.0);
            } else if key.starts_with("AppMag") && metadata.app_mag.is_none() {
                metadata.app_mag = parse_leading_number(value).filter(|v| *v > 0.0);
            }
        }

        metadata
    }

    pub fn is_aperio(&self) -> bool {
        self.vendor.as_deref() == Some("Aperio")
    }
}

/// Parse a number, or failing that its leading digits ("40x" gives 40).
fn parse_leading_number(value: &str) -> Option<f64> {
    if let Ok(parsed) = value.parse::<f64>() {
        return Some(parsed);
    }
    let end = value
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (c == '.' && i > 0)))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].trim_end_matches('.').parse::<f64>().ok()
}

/// The ImageDescription of an IFD, `None` when the tag is absent.
pub async fn read_image_description<R: RangeReader>(
    reader: &R,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<String>, TiffError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
        return Ok(None);
    };
    let description = ValueReader::new(reader, header).read_string(entry).await?;
    Ok(Some(description))
}
