//! One-shot encoding WASM bindings.
//!
//! These functions decode a file's bytes and encode them once, without a
//! workspace. Use them for single-image tools; use `JsWorkspace` to manage a
//! list of files.
//!
//! # Functions
//!
//! - [`encode_at_quality`] - Encode at a fixed quality
//! - [`encode_to_target_kb`] - Encode to fit a size budget in KB
//!
//! # Example
//!
//! ```typescript
//! import { encode_to_target_kb } from '@shrinkray/wasm';
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const result = encode_to_target_kb(bytes, 200);
//! const blob = new Blob([result.bytes()], { type: result.mime_type });
//! ```

use crate::types::JsEncodeResult;
use shrinkray_core::{
    ConversionRequest, ConvertError, Decoder, DefaultConverter, EncodeResult, TargetSize,
};
use wasm_bindgen::prelude::*;

/// Encode an image file at a fixed quality.
///
/// # Arguments
///
/// * `bytes` - The JPEG, PNG or WebP file contents
/// * `quality` - Quality from 0.05 to 1.0; out-of-range values are clamped
///
/// # Errors
///
/// Returns an error if the file can't be decoded or no output format could
/// be encoded.
#[wasm_bindgen]
pub fn encode_at_quality(bytes: &[u8], quality: f32) -> Result<JsEncodeResult, JsValue> {
    convert_bytes(bytes, ConversionRequest::quality(quality))
        .map(JsEncodeResult::from)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Encode an image file at the highest quality that fits `target_kb`.
///
/// Files already within the budget are encoded once at quality 0.8. When the
/// budget can't be met the smallest result is returned.
///
/// # Errors
///
/// Returns an error if `target_kb` isn't a positive number, the file can't be
/// decoded, or no output format could be encoded.
#[wasm_bindgen]
pub fn encode_to_target_kb(bytes: &[u8], target_kb: f64) -> Result<JsEncodeResult, JsValue> {
    TargetSize::from_kb(target_kb)
        .and_then(|target| convert_bytes(bytes, ConversionRequest::target(target)))
        .map(JsEncodeResult::from)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn convert_bytes(
    bytes: &[u8],
    request: ConversionRequest,
) -> Result<EncodeResult, ConvertError> {
    let converter = DefaultConverter::with_defaults();
    let image = converter.decoder().decode(bytes)?;
    converter
        .run_request(&image, bytes.len() as u64, &request)
        .map(|converted| converted.result)
}
