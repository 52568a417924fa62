//! HEIF-family input
//!
//! HEIC photos and AVIF files share the ISO base media container and are
//! recognized by the brand in their `ftyp` box. Decoding goes through the
//! system libheif and is only compiled with the `heif-input` feature.

use image::DynamicImage;

use crate::error::{ConvertError, ConvertResult};

/// Major brands of HEIF-family still images and sequences
const BRANDS: &[&[u8]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
    b"avif", b"avis",
];

/// Whether `input` starts with a HEIF-family `ftyp` box
pub fn is_heif(input: &[u8]) -> bool {
    match (input.get(4..8), input.get(8..12)) {
        (Some(b"ftyp"), Some(brand)) => BRANDS.contains(&brand),
        _ => false,
    }
}

#[cfg(feature = "heif-input")]
pub fn decode(input: &[u8]) -> ConvertResult<DynamicImage> {
    use image::{RgbImage, RgbaImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let unreadable = |e: libheif_rs::HeifError| ConvertError::Unreadable(format!("Cannot decode HEIF image: {}", e));

    let context = HeifContext::read_from_bytes(input).map_err(unreadable)?;
    let handle = context.primary_image_handle().map_err(unreadable)?;
    let (width, height) = (handle.width(), handle.height());
    let has_alpha = handle.has_alpha_channel();
    let chroma = if has_alpha { RgbChroma::Rgba } else { RgbChroma::Rgb };

    let decoded = LibHeif::new()
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(unreadable)?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConvertError::Unreadable("HEIF image has no interleaved plane".to_string()))?;

    let channels = if has_alpha { 4 } else { 3 };
    let row_len = width as usize * channels;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        let row = row
            .get(..row_len)
            .ok_or_else(|| ConvertError::Unreadable("Truncated HEIF pixel row".to_string()))?;
        pixels.extend_from_slice(row);
    }

    let img = if has_alpha {
        RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    };
    img.ok_or_else(|| ConvertError::Unreadable("HEIF pixel buffer has the wrong size".to_string()))
}

#[cfg(not(feature = "heif-input"))]
pub fn decode(_input: &[u8]) -> ConvertResult<DynamicImage> {
    Err(ConvertError::Unreadable(
        "HEIF input requires a build with the heif-input feature".to_string(),
    ))
}
