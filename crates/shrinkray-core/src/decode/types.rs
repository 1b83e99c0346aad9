//! Core types for image decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for image decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are empty or not a recognized image container.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),
}

/// EXIF orientation values (1-8).
/// See: https://exiftool.org/TagNames/EXIF.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    /// Normal (no transformation needed).
    #[default]
    Normal = 1,
    /// Horizontal flip.
    FlipHorizontal = 2,
    /// Rotate 180 degrees.
    Rotate180 = 3,
    /// Vertical flip.
    FlipVertical = 4,
    /// Transpose (flip horizontal + rotate 270 CW).
    Transpose = 5,
    /// Rotate 90 degrees clockwise.
    Rotate90CW = 6,
    /// Transverse (flip horizontal + rotate 90 CW).
    Transverse = 7,
    /// Rotate 270 degrees clockwise (90 CCW).
    Rotate270CW = 8,
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}

/// An immutable decoded raster with RGBA pixel data.
///
/// Produced once per source by a [`Decoder`](super::Decoder) and shared
/// read-only between the item that owns it and any in-flight conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    /// RGBA pixel data in row-major order (4 bytes per pixel).
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Bytes per pixel in the pixel buffer.
    pub const CHANNELS: usize = 4;

    /// Create a new RasterImage with the given dimensions and RGBA pixel data.
    ///
    /// Returns `None` if the buffer length doesn't match `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * Self::CHANNELS;
        if pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a RasterImage from an image::RgbaImage.
    pub fn from_rgba_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel data composited over black, 3 bytes per pixel.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixels.len() / Self::CHANNELS * 3);
        for px in self.pixels.chunks_exact(Self::CHANNELS) {
            let alpha = u16::from(px[3]);
            rgb.extend(
                px[..3]
                    .iter()
                    .map(|&c| ((u16::from(c) * alpha + 127) / 255) as u8),
            );
        }
        rgb
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
