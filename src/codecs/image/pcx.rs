//! PCX image output (24-bit, run-length encoded)

use ::pcx::WriterRgb;
use image::RgbImage;

use crate::error::{ConvertError, ConvertResult};

/// Resolution written into the header; PCX readers ignore it for display
const DPI: (u16, u16) = (72, 72);

pub fn encode(img: &RgbImage) -> ConvertResult<Vec<u8>> {
    let (width, height) = (dimension(img.width())?, dimension(img.height())?);
    if width == 0 || height == 0 {
        return Err(ConvertError::internal("Cannot encode an empty PCX image"));
    }

    let mut output = Vec::new();
    let mut writer = WriterRgb::new(&mut output, (width, height), DPI)
        .map_err(|e| ConvertError::internal(format!("PCX header: {}", e)))?;

    for row in img.as_raw().chunks_exact(usize::from(width) * 3) {
        writer
            .write_row(row)
            .map_err(|e| ConvertError::internal(format!("PCX row: {}", e)))?;
    }
    writer
        .finish()
        .map_err(|e| ConvertError::internal(format!("PCX finish: {}", e)))?;

    Ok(output)
}

fn dimension(value: u32) -> ConvertResult<u16> {
    u16::try_from(value)
        .map_err(|_| ConvertError::internal(format!("{} pixels is too large for PCX", value)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use image::Rgb;

    #[test]
    fn test_rows_read_back() {
        let img = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 200]));
        let bytes = encode(&img).unwrap();
        assert_eq!(bytes[0], 0x0A);

        let mut reader = ::pcx::Reader::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.dimensions(), (5, 3));
        assert!(!reader.is_paletted());

        let mut row = vec![0u8; 5 * 3];
        for y in 0..3 {
            reader.next_row_rgb(&mut row).unwrap();
            assert_eq!(row.as_slice(), &img.as_raw()[y * 15..(y + 1) * 15]);
        }
    }
}
