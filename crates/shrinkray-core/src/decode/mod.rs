//! Image decoding for Shrinkray.
//!
//! This module provides functionality for:
//! - Decoding JPEG, PNG and WebP sources into RGBA rasters
//! - Applying EXIF orientation so rasters match what a browser would display
//!
//! Decoding sits behind the [`Decoder`] trait so conversions can run against
//! any platform decoder. [`ImageDecoder`] is the default, pure-Rust one.
//!
//! # Examples
//!
//! ```ignore
//! use shrinkray_core::decode::{Decoder, ImageDecoder};
//!
//! let bytes = std::fs::read("photo.jpg").unwrap();
//! let image = ImageDecoder.decode(&bytes).unwrap();
//! println!("Decoded {}x{} image", image.width(), image.height());
//! ```

mod raster;
mod types;

pub use raster::{decode_image, Decoder, ImageDecoder};
pub use types::{DecodeError, Orientation, RasterImage};
