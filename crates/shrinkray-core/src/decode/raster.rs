//! Source decoding with EXIF orientation handling.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageReader};

use super::{DecodeError, Orientation, RasterImage};

/// Turns source file bytes into a raster image.
pub trait Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, DecodeError>;
}

/// Default decoder backed by the `image` crate.
///
/// Accepts any container the enabled codecs understand (JPEG, PNG, WebP),
/// sniffing the format from content rather than the file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, DecodeError> {
        decode_image(bytes)
    }
}

/// Decode image bytes, applying EXIF orientation correction.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` for empty or unrecognized bytes and
/// `DecodeError::CorruptedFile` when a recognized container fails to decode.
pub fn decode_image(bytes: &[u8]) -> Result<RasterImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidFormat);
    }

    let orientation = extract_orientation(bytes);

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat);
    }

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let oriented = apply_orientation(img, orientation);
    Ok(RasterImage::from_rgba_image(oriented.into_rgba8()))
}

/// EXIF orientation of `bytes`, `Normal` when there is none.
fn extract_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let pixels: Vec<u8> = (0..width * height)
            .flat_map(|i| [(i % 256) as u8, 64, 200, 255])
            .collect();
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, ExtendedColorType::Rgba8)
            .unwrap();
        out
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let pixels = vec![128u8; (width * height * 3) as usize];
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn test_decode_png() {
        let img = ImageDecoder.decode(&png_bytes(3, 2)).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.pixels().len(), 3 * 2 * 4);
        assert_eq!(&img.pixels()[4..8], &[1, 64, 200, 255]);
    }

    #[test]
    fn test_decode_jpeg() {
        let img = decode_image(&jpeg_bytes(8, 4)).unwrap();
        assert_eq!((img.width(), img.height()), (8, 4));
        // JPEG has no alpha, so every pixel decodes opaque
        assert!(img.pixels().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_decode_empty_bytes() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::InvalidFormat)));
    }

    #[test]
    fn test_decode_unrecognized_bytes() {
        let result = decode_image(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(DecodeError::InvalidFormat)));
    }

    #[test]
    fn test_decode_truncated_png() {
        let bytes = png_bytes(16, 16);
        let result = decode_image(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(DecodeError::CorruptedFile(_))));
    }

    #[test]
    fn test_orientation_without_exif() {
        assert_eq!(extract_orientation(&png_bytes(1, 1)), Orientation::Normal);
        assert_eq!(extract_orientation(&[0x00, 0x01]), Orientation::Normal);
    }

    #[test]
    fn test_apply_orientation_rotate90_swaps_dimensions() {
        let rgb = image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 255, 0]).unwrap();
        let rotated = apply_orientation(DynamicImage::ImageRgb8(rgb), Orientation::Rotate90CW);
        assert_eq!((rotated.width(), rotated.height()), (1, 2));
    }

    #[test]
    fn test_apply_orientation_flip_horizontal() {
        let rgb = image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 255, 0]).unwrap();
        let flipped = apply_orientation(DynamicImage::ImageRgb8(rgb), Orientation::FlipHorizontal)
            .into_rgb8();
        assert_eq!(flipped.get_pixel(0, 0).0, [0, 255, 0]);
        assert_eq!(flipped.get_pixel(1, 0).0, [255, 0, 0]);
    }
}
