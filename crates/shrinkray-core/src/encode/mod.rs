//! Image encoding for Shrinkray.
//!
//! This module provides functionality for:
//! - Encoding rasters at a quality in an ordered list of candidate formats
//! - The [`RasterSurface`] seam that hides the platform codec
//!
//! # Architecture
//!
//! [`Encoder`] owns the format fallback order and quality clamping.
//! A [`RasterSurface`] only answers "give me these pixels as this format at
//! this quality", reporting missing capability as `Ok(None)`.
//!
//! # Examples
//!
//! ```ignore
//! use shrinkray_core::encode::{CodecSurface, Encoder, FormatPolicy};
//!
//! let encoder = Encoder::new(CodecSurface::new());
//! let result = encoder.encode(&image, FormatPolicy::compress(), 0.8).unwrap();
//! println!("Encoded {} bytes as {:?}", result.byte_size(), result.format);
//! ```

mod encoder;
mod format;
mod surface;

pub use encoder::{EncodeResult, Encoder};
pub use format::{FormatPolicy, OutputFormat};
pub use surface::{jpeg_quality, CodecSurface, RasterSurface, SurfaceError};
