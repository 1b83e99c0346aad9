//! Shrinkray Core - Image compression library
//!
//! This crate provides the core conversion functionality for Shrinkray,
//! including decoding, quality-driven and size-targeted encoding, batch
//! conversion, and lifecycle tracking of the handles a UI derives from
//! converted items.
//!
//! All state lives in a caller-owned [`WorkingSet`]; a [`Converter`] does the
//! work and can be shared between sets.

pub mod convert;
pub mod decode;
pub mod encode;
pub mod error;
pub mod export;
pub mod item;
pub mod ledger;
pub mod pipeline;
pub mod search;
pub mod settings;
pub mod working_set;

#[cfg(test)]
mod testing;

pub use convert::{Converter, DefaultConverter};
pub use decode::{Decoder, ImageDecoder, RasterImage};
pub use encode::{CodecSurface, EncodeResult, Encoder, FormatPolicy, OutputFormat, RasterSurface};
pub use error::{ConvertError, ErrorKind};
pub use export::{export_entries, format_bytes, output_file_name, ExportEntry, SizeReport};
pub use item::{
    Conversion, ConversionItem, ConversionRequest, ConversionTicket, Converted, ItemId, ItemState,
};
pub use ledger::{HandleKind, HandleReleaser, NoopReleaser, ResourceLedger};
pub use pipeline::{
    BatchMode, BatchOutcome, BatchPipeline, BatchPlan, BatchProgress, BatchRun, BatchSummary,
    ConvertedSummary, StopHandle,
};
pub use search::{SearchOutcome, SizeTargetingSearch};
pub use settings::{CompressionSettings, TargetSize, DEFAULT_QUALITY, MAX_QUALITY, MIN_QUALITY};
pub use working_set::WorkingSet;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 8) as u8, (y * 8) as u8, ((x ^ y) * 4) as u8, 255])
        });
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_default_converter_end_to_end() {
        let converter = DefaultConverter::with_defaults();
        let mut set = WorkingSet::new();
        let good = set.add("tile.png", png_bytes(32, 32));
        let broken = set.add("junk.png", &b"not an image"[..]);

        let summary = BatchPipeline::new(&converter)
            .run_all(&mut set, |_| ConversionRequest::quality(0.7), |_| {})
            .finish();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 1);

        let item = set.get(good).unwrap();
        let result = item.last_result().unwrap();
        // No lossy WebP in the pure-Rust codec, so the fallback is used
        assert_eq!(result.format, OutputFormat::Jpeg);
        assert_eq!(&result.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!(item.image().unwrap().width(), 32);

        assert_eq!(
            set.get(broken).unwrap().last_error().map(ConvertError::kind),
            Some(ErrorKind::InvalidImage)
        );

        let entries = export_entries(&set, converter.settings());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "tile-compressed.jpg");
    }

    #[test]
    fn test_fast_path_for_small_originals() {
        let converter = DefaultConverter::with_defaults();
        let mut set = WorkingSet::new();
        let bytes = png_bytes(8, 8);
        assert!(bytes.len() <= 2048);
        let id = set.add("small.png", bytes);

        let target = TargetSize::from_kb(2.0).unwrap();
        set.encode_to_target_size(id, target, &converter).unwrap();
        assert_eq!(set.get(id).unwrap().quality(), DEFAULT_QUALITY);
    }
}
