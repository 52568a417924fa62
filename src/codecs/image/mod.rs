//! Raster and HEIF-family image conversion
//!
//! Every image is decoded, normalized to an 8-bit color model and re-encoded.
//! Normalization is an explicit [`AlphaPolicy`]: by default every output is
//! flattened to RGB; `PreserveWhereSupported` keeps RGBA for targets whose
//! container can carry an alpha channel. ICO entries are always RGBA, opaque
//! when flattened.
//!
//! The `image` crate covers most targets. PCX goes through the `pcx` crate
//! and SGI is written here. HEIF-family input is decoded by the `heif` submodule.

mod heif;
mod pcx;
mod sgi;

use std::io::Cursor;

use image::codecs::avif::AvifEncoder;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use super::{Converter, SourceHint};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::CanonicalFormat;

/// Largest edge an ICO entry can hold
const ICO_MAX_EDGE: u32 = 256;

/// HEIF output quality (0-100)
const HEIF_QUALITY: u8 = 95;

/// Encoder speed (1 slowest - 10 fastest); kept high to stay inside the request deadline
const HEIF_SPEED: u8 = 8;

/// How the alpha channel is treated before re-encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaPolicy {
    /// Always normalize to RGB8
    #[default]
    Flatten,
    /// Keep RGBA8 when both source and target support alpha
    PreserveWhereSupported,
}

/// Sniff the format of an uploaded image
pub fn sniff(input: &[u8]) -> ConvertResult<SourceHint> {
    if heif::is_heif(input) {
        return Ok(SourceHint::Heif);
    }
    image::guess_format(input)
        .map(SourceHint::Raster)
        .map_err(|e| ConvertError::Unreadable(format!("Unrecognized image data: {}", e)))
}

fn decode(input: &[u8], source: SourceHint) -> ConvertResult<DynamicImage> {
    match source {
        SourceHint::Raster(format) => image::load_from_memory_with_format(input, format)
            .map_err(|e| ConvertError::Unreadable(format!("Cannot decode {:?} image: {}", format, e))),
        SourceHint::Heif => heif::decode(input),
        SourceHint::Document(format) => Err(ConvertError::UnsupportedRoute {
            from: format.to_string(),
            to: "image".to_string(),
        }),
    }
}

/// Normalize pixel data to the color model `target` is encoded with
pub fn normalize(img: DynamicImage, target: CanonicalFormat, policy: AlphaPolicy) -> DynamicImage {
    let keep_alpha = policy == AlphaPolicy::PreserveWhereSupported
        && target.supports_alpha()
        && img.color().has_alpha();

    if keep_alpha {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else if target == CanonicalFormat::Ico {
        // ICO entries must be 32-bit; flattening leaves them fully opaque
        DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(img.to_rgb8()).to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

/// Encoder used for a raster target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoder {
    Image(ImageFormat),
    Pcx,
    Sgi,
}

fn encoder_for(target: CanonicalFormat) -> ConvertResult<Encoder> {
    match target {
        CanonicalFormat::Bmp => Ok(Encoder::Image(ImageFormat::Bmp)),
        CanonicalFormat::Gif => Ok(Encoder::Image(ImageFormat::Gif)),
        CanonicalFormat::Ico => Ok(Encoder::Image(ImageFormat::Ico)),
        CanonicalFormat::Jpeg => Ok(Encoder::Image(ImageFormat::Jpeg)),
        CanonicalFormat::Png => Ok(Encoder::Image(ImageFormat::Png)),
        CanonicalFormat::Ppm => Ok(Encoder::Image(ImageFormat::Pnm)),
        CanonicalFormat::Webp => Ok(Encoder::Image(ImageFormat::WebP)),
        CanonicalFormat::Tiff => Ok(Encoder::Image(ImageFormat::Tiff)),
        CanonicalFormat::Pcx => Ok(Encoder::Pcx),
        CanonicalFormat::Sgi => Ok(Encoder::Sgi),
        other => Err(ConvertError::UnsupportedRoute {
            from: "image".to_string(),
            to: other.to_string(),
        }),
    }
}

// ============================================================================
// Raster converter
// ============================================================================

/// Converter for the raster image family
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterConverter {
    alpha: AlphaPolicy,
}

impl RasterConverter {
    pub fn new(alpha: AlphaPolicy) -> Self {
        Self { alpha }
    }
}

impl Converter for RasterConverter {
    fn convert(
        &self,
        input: &[u8],
        source: SourceHint,
        target: CanonicalFormat,
    ) -> ConvertResult<Vec<u8>> {
        let encoder = encoder_for(target)?;
        let mut img = normalize(decode(input, source)?, target, self.alpha);

        if target == CanonicalFormat::Ico
            && (img.width() > ICO_MAX_EDGE || img.height() > ICO_MAX_EDGE)
        {
            img = img.thumbnail(ICO_MAX_EDGE, ICO_MAX_EDGE);
        }

        let output = match encoder {
            Encoder::Image(format) => {
                let mut output = Cursor::new(Vec::new());
                img.write_to(&mut output, format).map_err(|e| {
                    ConvertError::internal(format!("Encoding {} failed: {}", target, e))
                })?;
                output.into_inner()
            }
            Encoder::Pcx => pcx::encode(&img.to_rgb8())?,
            Encoder::Sgi => sgi::encode(&img)?,
        };

        tracing::debug!(
            source = ?source,
            target = %target,
            width = img.width(),
            height = img.height(),
            "Image converted"
        );

        Ok(output)
    }
}

// ============================================================================
// HEIF converter
// ============================================================================

/// Converter for HEIF output
///
/// Encodes the AV1 profile of the HEIF container, the only HEIF codec
/// available without native libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeifConverter;

impl Converter for HeifConverter {
    fn convert(
        &self,
        input: &[u8],
        source: SourceHint,
        target: CanonicalFormat,
    ) -> ConvertResult<Vec<u8>> {
        if target != CanonicalFormat::Heif {
            return Err(ConvertError::UnsupportedRoute {
                from: "image".to_string(),
                to: target.to_string(),
            });
        }

        let img = normalize(decode(input, source)?, target, AlphaPolicy::Flatten);

        let mut output = Vec::new();
        let encoder = AvifEncoder::new_with_speed_quality(&mut output, HEIF_SPEED, HEIF_QUALITY);
        img.write_with_encoder(encoder)
            .map_err(|e| ConvertError::internal(format!("Encoding HEIF failed: {}", e)))?;

        tracing::debug!(source = ?source, "Image converted successfully to HEIF");
        Ok(output)
    }
}
