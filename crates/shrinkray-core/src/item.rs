//! Per-image conversion state.
//!
//! A [`ConversionItem`] moves `Pending -> Converting -> Converted | Failed`.
//! The terminal states accept a new request, which sends the item back
//! through `Converting` and replaces the previous result or error.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decode::RasterImage;
use crate::encode::EncodeResult;
use crate::error::ConvertError;
use crate::settings::{clamp_quality, TargetSize, DEFAULT_QUALITY};

/// Opaque identifier of an item within a working set. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Pending,
    Converting,
    Converted,
    Failed,
}

/// What a conversion should aim for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionRequest {
    /// Encode once at this quality.
    Quality { quality: f32 },
    /// Search for the highest quality that fits this budget.
    TargetSize { target: TargetSize },
}

impl ConversionRequest {
    /// Request a fixed quality, clamped to `[0.05, 1.0]`.
    pub fn quality(quality: f32) -> Self {
        ConversionRequest::Quality {
            quality: clamp_quality(quality),
        }
    }

    pub fn target(target: TargetSize) -> Self {
        ConversionRequest::TargetSize { target }
    }
}

/// One source image and its conversion state.
#[derive(Debug, Clone)]
pub struct ConversionItem {
    id: ItemId,
    source_name: String,
    source: Arc<[u8]>,
    image: Option<Arc<RasterImage>>,
    state: ItemState,
    quality: f32,
    last_request: Option<ConversionRequest>,
    last_result: Option<EncodeResult>,
    last_error: Option<ConvertError>,
    output_name: Option<String>,
    generation: u64,
}

impl ConversionItem {
    pub(crate) fn new(id: ItemId, source_name: impl Into<String>, source: Arc<[u8]>) -> Self {
        Self {
            id,
            source_name: source_name.into(),
            source,
            image: None,
            state: ItemState::Pending,
            quality: DEFAULT_QUALITY,
            last_request: None,
            last_result: None,
            last_error: None,
            output_name: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn original_byte_size(&self) -> u64 {
        self.source.len() as u64
    }

    /// Decoded raster, once a conversion has decoded it.
    pub fn image(&self) -> Option<&RasterImage> {
        self.image.as_deref()
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Quality of the most recent successful conversion (0.8 before any).
    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn last_request(&self) -> Option<&ConversionRequest> {
        self.last_request.as_ref()
    }

    pub fn last_result(&self) -> Option<&EncodeResult> {
        self.last_result.as_ref()
    }

    pub fn last_error(&self) -> Option<&ConvertError> {
        self.last_error.as_ref()
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub(crate) fn set_output_name(&mut self, name: Option<String>) {
        self.output_name = name;
    }

    /// Whether the item holds a result for exactly this request.
    pub fn is_converted_with(&self, request: &ConversionRequest) -> bool {
        self.state == ItemState::Converted && self.last_request.as_ref() == Some(request)
    }

    /// Move into `Converting`, handing out the work for this conversion.
    ///
    /// The previous result and error are dropped here so the state invariant
    /// holds while the conversion is in flight.
    pub(crate) fn begin(
        &mut self,
        request: ConversionRequest,
    ) -> Result<ConversionTicket, ConvertError> {
        if self.state == ItemState::Converting {
            return Err(ConvertError::ConversionInProgress { id: self.id });
        }
        self.state = ItemState::Converting;
        self.generation += 1;
        self.last_result = None;
        self.last_error = None;
        Ok(ConversionTicket {
            id: self.id,
            generation: self.generation,
            source: Arc::clone(&self.source),
            image: self.image.clone(),
            request,
        })
    }

    /// Whether `conversion` belongs to the conversion currently in flight.
    pub(crate) fn is_awaiting(&self, conversion: &Conversion) -> bool {
        self.state == ItemState::Converting && self.generation == conversion.generation
    }

    /// Apply a finished conversion. Callers check [`Self::is_awaiting`] first.
    pub(crate) fn complete(&mut self, conversion: Conversion) -> Result<(), ConvertError> {
        debug_assert!(self.is_awaiting(&conversion));
        if conversion.image.is_some() {
            self.image = conversion.image;
        }
        self.last_request = Some(conversion.request);
        match conversion.outcome {
            Ok(converted) => {
                self.quality = converted.quality;
                self.last_result = Some(converted.result);
                self.state = ItemState::Converted;
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                self.state = ItemState::Failed;
                Err(err)
            }
        }
    }

    /// Return an in-flight item to `Pending` without a result.
    pub(crate) fn abandon(&mut self, ticket: &ConversionTicket) {
        if self.state == ItemState::Converting && self.generation == ticket.generation {
            self.state = ItemState::Pending;
        }
    }
}

/// Work handed out by `begin_conversion`.
///
/// Holds shared handles to the item's source and any cached raster, so the
/// conversion can run without borrowing the working set.
#[derive(Debug, Clone)]
pub struct ConversionTicket {
    id: ItemId,
    generation: u64,
    source: Arc<[u8]>,
    image: Option<Arc<RasterImage>>,
    request: ConversionRequest,
}

impl ConversionTicket {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn request(&self) -> &ConversionRequest {
        &self.request
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn original_byte_size(&self) -> u64 {
        self.source.len() as u64
    }

    pub(crate) fn cached_image(&self) -> Option<&Arc<RasterImage>> {
        self.image.as_ref()
    }

    /// Close the ticket with its outcome. `image` is a freshly decoded
    /// raster to cache on the item, if one was produced.
    pub fn finish(
        self,
        image: Option<Arc<RasterImage>>,
        outcome: Result<Converted, ConvertError>,
    ) -> Conversion {
        Conversion {
            id: self.id,
            generation: self.generation,
            image,
            request: self.request,
            outcome,
        }
    }
}

/// A successful encode and the quality it was produced at.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub result: EncodeResult,
    pub quality: f32,
}

/// A finished conversion, ready to be applied to its item.
#[derive(Debug, Clone)]
pub struct Conversion {
    id: ItemId,
    generation: u64,
    image: Option<Arc<RasterImage>>,
    request: ConversionRequest,
    outcome: Result<Converted, ConvertError>,
}

impl Conversion {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn outcome(&self) -> &Result<Converted, ConvertError> {
        &self.outcome
    }
}
