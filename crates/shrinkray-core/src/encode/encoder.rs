//! Quality-parameterised encoding with ordered format fallback.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{FormatPolicy, OutputFormat, RasterSurface};
use crate::decode::RasterImage;
use crate::error::ConvertError;
use crate::settings::clamp_quality;

/// Encoded bytes plus the parameters that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeResult {
    #[serde(skip)]
    bytes: Arc<[u8]>,
    pub format: OutputFormat,
    /// Quality actually used, after clamping.
    pub quality: f32,
}

impl EncodeResult {
    pub fn new(bytes: Vec<u8>, format: OutputFormat, quality: f32) -> Self {
        Self {
            bytes: bytes.into(),
            format,
            quality,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the encoded bytes.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Encoder over a [`RasterSurface`].
///
/// Pure function of (pixels, format policy, quality): nothing is cached
/// between calls.
#[derive(Debug, Clone, Default)]
pub struct Encoder<S> {
    surface: S,
}

impl<S: RasterSurface> Encoder<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Encode `image` at `quality`, trying each format of `formats` in order.
    ///
    /// `quality` is clamped to `[0.05, 1.0]` silently.
    ///
    /// # Errors
    ///
    /// `EncodeUnsupported` when every format is absent from the surface, or
    /// `Unknown` when the last format attempted failed unexpectedly.
    pub fn encode(
        &self,
        image: &RasterImage,
        formats: FormatPolicy,
        quality: f32,
    ) -> Result<EncodeResult, ConvertError> {
        let quality = clamp_quality(quality);
        let mut failure = None;

        for format in formats.order() {
            match self.surface.extract(image, format, quality) {
                Ok(Some(bytes)) => return Ok(EncodeResult::new(bytes, format, quality)),
                Ok(None) => {
                    debug!(?format, "format not available, trying fallback");
                    failure = None;
                }
                Err(err) => {
                    debug!(?format, error = %err, "surface failed to encode");
                    failure = Some(err);
                }
            }
        }

        Err(match failure {
            Some(err) => ConvertError::Unknown(err.to_string()),
            None => ConvertError::EncodeUnsupported,
        })
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
