//! Running conversion requests against a decoder and encoder.

use std::sync::Arc;

use tracing::debug;

use crate::decode::{Decoder, ImageDecoder, RasterImage};
use crate::encode::{CodecSurface, EncodeResult, Encoder, RasterSurface};
use crate::error::ConvertError;
use crate::item::{Conversion, ConversionRequest, ConversionTicket, Converted};
use crate::search::{SearchOutcome, SizeTargetingSearch};
use crate::settings::{CompressionSettings, TargetSize};

/// Converter using the pure-Rust decoder and codec surface.
pub type DefaultConverter = Converter<ImageDecoder, CodecSurface>;

/// Decodes sources and encodes them per [`ConversionRequest`].
///
/// Holds no per-item state; one converter serves any number of items and
/// working sets.
#[derive(Debug)]
pub struct Converter<D, S> {
    decoder: D,
    encoder: Encoder<S>,
    settings: CompressionSettings,
}

impl DefaultConverter {
    /// Converter with the default decoder, surface and settings.
    pub fn with_defaults() -> Self {
        Self {
            decoder: ImageDecoder,
            encoder: Encoder::new(CodecSurface::new()),
            settings: CompressionSettings::default(),
        }
    }

    /// Default decoder with a surface matched to `settings.formats`.
    ///
    /// # Errors
    ///
    /// `InvalidSettings` if `settings` fails validation.
    pub fn with_settings(settings: CompressionSettings) -> Result<Self, ConvertError> {
        let surface = CodecSurface::for_policy(&settings.formats);
        Self::new(ImageDecoder, surface, settings)
    }
}

impl<D: Decoder, S: RasterSurface> Converter<D, S> {
    /// # Errors
    ///
    /// `InvalidSettings` if `settings` fails validation.
    pub fn new(
        decoder: D,
        surface: S,
        settings: CompressionSettings,
    ) -> Result<Self, ConvertError> {
        settings.validate()?;
        Ok(Self {
            decoder,
            encoder: Encoder::new(surface),
            settings,
        })
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn encoder(&self) -> &Encoder<S> {
        &self.encoder
    }

    /// Encode `image` once at `quality` using the configured formats.
    pub fn encode_at_quality(
        &self,
        image: &RasterImage,
        quality: f32,
    ) -> Result<EncodeResult, ConvertError> {
        self.encoder.encode(image, self.settings.formats, quality)
    }

    /// Encode `image` for a byte budget. See [`SizeTargetingSearch`].
    pub fn encode_to_target_size(
        &self,
        image: &RasterImage,
        original_size: u64,
        target: TargetSize,
    ) -> Result<SearchOutcome, ConvertError> {
        SizeTargetingSearch::new(&self.encoder, &self.settings).search(image, original_size, target)
    }

    /// Carry out `request` on an already decoded image.
    pub fn run_request(
        &self,
        image: &RasterImage,
        original_size: u64,
        request: &ConversionRequest,
    ) -> Result<Converted, ConvertError> {
        match *request {
            ConversionRequest::Quality { quality } => {
                let result = self.encode_at_quality(image, quality)?;
                Ok(Converted {
                    quality: result.quality,
                    result,
                })
            }
            ConversionRequest::TargetSize { target } => {
                let outcome = self.encode_to_target_size(image, original_size, target)?;
                Ok(Converted {
                    result: outcome.result,
                    quality: outcome.quality,
                })
            }
        }
    }

    /// Run the work of a ticket, decoding the source if it isn't cached.
    pub fn convert(&self, ticket: ConversionTicket) -> Conversion {
        let (image, fresh) = match ticket.cached_image() {
            Some(image) => (Arc::clone(image), false),
            None => match self.decoder.decode(ticket.source_bytes()) {
                Ok(image) => (Arc::new(image), true),
                Err(err) => {
                    debug!(id = %ticket.id(), error = %err, "decode failed");
                    return ticket.finish(None, Err(err.into()));
                }
            },
        };

        let outcome = self.run_request(&image, ticket.original_byte_size(), ticket.request());
        ticket.finish(fresh.then_some(image), outcome)
    }
}
