//! SGI image output
//!
//! Writes the uncompressed (verbatim) storage form: a 512-byte big-endian
//! header followed by one plane per channel, rows stored bottom to top.

use image::DynamicImage;

use crate::error::{ConvertError, ConvertResult};

const MAGIC: u16 = 474;
const HEADER_LEN: usize = 512;
const IMAGE_NAME_LEN: usize = 80;

/// Encode `img` as RGB, or RGBA when it carries an alpha channel
pub fn encode(img: &DynamicImage) -> ConvertResult<Vec<u8>> {
    let width = dimension(img.width())?;
    let height = dimension(img.height())?;

    let (channels, pixels) = if img.color().has_alpha() {
        (4u16, img.to_rgba8().into_raw())
    } else {
        (3u16, img.to_rgb8().into_raw())
    };

    let mut output = Vec::with_capacity(HEADER_LEN + pixels.len());
    output.extend_from_slice(&MAGIC.to_be_bytes());
    output.push(0); // storage: verbatim
    output.push(1); // bytes per channel
    output.extend_from_slice(&3u16.to_be_bytes()); // dimension
    output.extend_from_slice(&width.to_be_bytes());
    output.extend_from_slice(&height.to_be_bytes());
    output.extend_from_slice(&channels.to_be_bytes());
    output.extend_from_slice(&0i32.to_be_bytes()); // pixmin
    output.extend_from_slice(&255i32.to_be_bytes()); // pixmax
    output.extend_from_slice(&[0; 4]);
    output.extend_from_slice(&[0; IMAGE_NAME_LEN]);
    output.extend_from_slice(&0i32.to_be_bytes()); // colormap: normal
    output.resize(HEADER_LEN, 0);

    let (width, height, channels) = (width as usize, height as usize, channels as usize);
    for channel in 0..channels {
        for y in (0..height).rev() {
            let row = &pixels[y * width * channels..(y + 1) * width * channels];
            output.extend(row.iter().skip(channel).step_by(channels));
        }
    }

    Ok(output)
}

fn dimension(value: u32) -> ConvertResult<u16> {
    u16::try_from(value)
        .map_err(|_| ConvertError::internal(format!("{} pixels is too large for SGI", value)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    /// Minimal verbatim SGI reader: (width, height, channels, top-down interleaved pixels)
    pub(crate) fn decode(bytes: &[u8]) -> (usize, usize, usize, Vec<u8>) {
        let be16 = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]) as usize;
        assert_eq!(be16(0), MAGIC as usize);
        assert_eq!(bytes[2], 0, "expected verbatim storage");
        let (width, height, channels) = (be16(6), be16(8), be16(10));
        assert_eq!(bytes.len(), HEADER_LEN + width * height * channels);

        let plane = width * height;
        let mut pixels = vec![0u8; plane * channels];
        for channel in 0..channels {
            for stored_row in 0..height {
                let y = height - 1 - stored_row;
                for x in 0..width {
                    pixels[(y * width + x) * channels + channel] =
                        bytes[HEADER_LEN + channel * plane + stored_row * width + x];
                }
            }
        }
        (width, height, channels, pixels)
    }

    #[test]
    fn test_rgb_layout() {
        let img = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8 * 10, y as u8 * 100, 7]));
        let bytes = encode(&DynamicImage::ImageRgb8(img.clone())).unwrap();

        assert_eq!(&bytes[..2], &[0x01, 0xDA]);
        let (width, height, channels, pixels) = decode(&bytes);
        assert_eq!((width, height, channels), (3, 2, 3));
        assert_eq!(pixels, img.into_raw());
    }

    #[test]
    fn test_rgba_keeps_alpha_plane() {
        let img = RgbaImage::from_fn(2, 2, |x, _| Rgba([1, 2, 3, if x == 0 { 0 } else { 255 }]));
        let bytes = encode(&DynamicImage::ImageRgba8(img.clone())).unwrap();

        let (_, _, channels, pixels) = decode(&bytes);
        assert_eq!(channels, 4);
        assert_eq!(pixels, img.into_raw());
    }
}
