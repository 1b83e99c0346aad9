//! Error types shared by every conversion operation.
//!
//! Every failure in this crate is scoped to a single item. Batch runs capture
//! the error on the item and keep going; nothing here aborts a whole run.

use serde::Serialize;
use thiserror::Error;

use crate::decode::DecodeError;
use crate::item::ItemId;

/// Errors produced while converting an item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// The source bytes could not be decoded into a raster image.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Neither the primary nor the fallback format could be produced.
    #[error("No supported output format could be encoded")]
    EncodeUnsupported,

    /// The item already has a conversion in flight.
    #[error("Conversion already in progress for item {id}")]
    ConversionInProgress { id: ItemId },

    /// Unexpected platform failure while encoding.
    #[error("Encoding failed: {0}")]
    Unknown(String),

    /// The finished conversion no longer matches the item's in-flight one.
    #[error("Conversion for item {id} was abandoned or superseded")]
    StaleConversion { id: ItemId },

    /// No item with this id exists in the working set.
    #[error("Unknown item {id}")]
    UnknownItem { id: ItemId },

    /// The requested size budget is not a usable number.
    #[error("Invalid target size: {0}")]
    InvalidTarget(String),

    /// A custom output file name was rejected.
    #[error("Invalid output name: {0}")]
    InvalidOutputName(String),

    /// A settings value is outside its allowed range.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// Coarse classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidImage,
    EncodeUnsupported,
    ConversionInProgress,
    Unknown,
    StaleConversion,
    UnknownItem,
    InvalidTarget,
    InvalidOutputName,
    InvalidSettings,
}

impl ConvertError {
    /// The kind of this error, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidImage(_) => ErrorKind::InvalidImage,
            ConvertError::EncodeUnsupported => ErrorKind::EncodeUnsupported,
            ConvertError::ConversionInProgress { .. } => ErrorKind::ConversionInProgress,
            ConvertError::Unknown(_) => ErrorKind::Unknown,
            ConvertError::StaleConversion { .. } => ErrorKind::StaleConversion,
            ConvertError::UnknownItem { .. } => ErrorKind::UnknownItem,
            ConvertError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            ConvertError::InvalidOutputName(_) => ErrorKind::InvalidOutputName,
            ConvertError::InvalidSettings(_) => ErrorKind::InvalidSettings,
        }
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// Only the re-entrancy guard is recoverable: once the in-flight
    /// conversion finishes, the item accepts new requests again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConvertError::ConversionInProgress { .. })
    }
}

impl From<DecodeError> for ConvertError {
    fn from(err: DecodeError) -> Self {
        ConvertError::InvalidImage(err.to_string())
    }
}
