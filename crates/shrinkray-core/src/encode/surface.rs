//! Raster surfaces: the platform piece that turns pixels into encoded bytes.
//!
//! A surface reports capability absence as `Ok(None)` rather than an error.
//! The encoder relies on that to walk its format fallback order without
//! treating a missing codec as a fault.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

use super::{FormatPolicy, OutputFormat};
use crate::decode::RasterImage;

/// Unexpected failure inside a surface while producing a buffer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SurfaceError(pub String);

/// Offscreen drawing and byte-buffer extraction per format and quality.
pub trait RasterSurface {
    /// Encode `image` as `format` at `quality` (already clamped to
    /// `[0.05, 1.0]`).
    ///
    /// Returns `Ok(None)` when the surface cannot produce `format` at all.
    fn extract(
        &self,
        image: &RasterImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, SurfaceError>;
}

impl<S: RasterSurface + ?Sized> RasterSurface for &S {
    fn extract(
        &self,
        image: &RasterImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, SurfaceError> {
        (**self).extract(image, format, quality)
    }
}

/// Surface backed by the `image` crate's encoders.
///
/// JPEG is lossy and honors quality. PNG is lossless and ignores it. The
/// `image` crate only writes lossless WebP, so WebP is reported as absent
/// unless [`CodecSurface::with_lossless_webp`] opts into it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecSurface {
    lossless_webp: bool,
}

impl CodecSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce lossless WebP when WebP is requested.
    pub fn with_lossless_webp() -> Self {
        Self {
            lossless_webp: true,
        }
    }

    /// Surface suited to `policy`. A WebP-only policy gets lossless WebP;
    /// anything with a fallback keeps WebP absent so the fallback's quality
    /// curve drives size targeting.
    pub fn for_policy(policy: &FormatPolicy) -> Self {
        match (policy.primary, policy.fallback) {
            (OutputFormat::WebP, None) => Self::with_lossless_webp(),
            _ => Self::new(),
        }
    }
}

impl RasterSurface for CodecSurface {
    fn extract(
        &self,
        image: &RasterImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Option<Vec<u8>>, SurfaceError> {
        if image.is_empty() {
            return Err(SurfaceError(format!(
                "cannot encode {}x{} image",
                image.width(),
                image.height()
            )));
        }

        let mut buffer = Vec::new();
        let written = match format {
            OutputFormat::Jpeg => {
                // No alpha in JPEG; pixels are composited over black.
                let rgb = image.to_rgb();
                JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality)).write_image(
                    &rgb,
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgb8,
                )
            }
            OutputFormat::Png => PngEncoder::new(&mut buffer).write_image(
                image.pixels(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            ),
            OutputFormat::WebP if self.lossless_webp => WebPEncoder::new_lossless(&mut buffer)
                .write_image(
                    image.pixels(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgba8,
                ),
            OutputFormat::WebP => return Ok(None),
        };

        written.map_err(|e| SurfaceError(e.to_string()))?;
        Ok(Some(buffer))
    }
}

/// Map a `[0.05, 1.0]` quality onto the JPEG encoder's 1-100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
