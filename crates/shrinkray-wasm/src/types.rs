//! WASM-compatible wrapper types for conversion results.
//!
//! This module provides JavaScript-friendly types that wrap the core Shrinkray
//! types, handling the conversion between Rust and JavaScript data
//! representations.

use serde::Serialize;
use shrinkray_core::{
    BatchOutcome, BatchProgress, ConversionItem, EncodeResult, ErrorKind, ItemState,
};
use wasm_bindgen::prelude::*;

/// An encoded image for JavaScript.
///
/// # Memory Management
///
/// The encoded bytes stay in WASM memory. `bytes()` copies them into a
/// `Uint8Array`; `byte_length` and the format getters don't.
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsEncodeResult {
    inner: EncodeResult,
}

#[wasm_bindgen]
impl JsEncodeResult {
    /// Encoded size in bytes
    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> f64 {
        self.inner.byte_size() as f64
    }

    /// Quality the bytes were encoded at (0.05 to 1.0)
    #[wasm_bindgen(getter)]
    pub fn quality(&self) -> f32 {
        self.inner.quality
    }

    /// MIME type, e.g. `image/webp`
    #[wasm_bindgen(getter)]
    pub fn mime_type(&self) -> String {
        self.inner.format.mime_type().to_string()
    }

    /// File extension without the dot
    #[wasm_bindgen(getter)]
    pub fn extension(&self) -> String {
        self.inner.format.extension().to_string()
    }

    /// Returns the encoded bytes as Uint8Array.
    ///
    /// Note: This creates a copy of the data.
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.bytes().to_vec()
    }
}

impl From<EncodeResult> for JsEncodeResult {
    fn from(inner: EncodeResult) -> Self {
        Self { inner }
    }
}

/// Plain snapshot of an item, serialized to a JS object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub id: u64,
    pub name: String,
    pub state: ItemState,
    pub quality: f32,
    pub original_bytes: u64,
    pub encoded_bytes: Option<u64>,
    pub mime_type: Option<&'static str>,
    pub output_name: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub result_url: Option<String>,
}

impl ItemSnapshot {
    pub fn new(item: &ConversionItem, result_url: Option<String>) -> Self {
        let result = item.last_result();
        Self {
            id: item.id().get(),
            name: item.source_name().to_string(),
            state: item.state(),
            quality: item.quality(),
            original_bytes: item.original_byte_size(),
            encoded_bytes: result.map(EncodeResult::byte_size),
            mime_type: result.map(|r| r.format.mime_type()),
            output_name: item.output_name().map(str::to_string),
            error: item.last_error().map(|e| e.to_string()),
            error_kind: item.last_error().map(|e| e.kind()),
            result_url,
        }
    }
}

/// One finished item of a stepped batch, serialized to a JS object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemReport {
    pub id: u64,
    pub completed: usize,
    pub total: usize,
    pub converted: bool,
    pub mime_type: Option<&'static str>,
    pub encoded_bytes: Option<u64>,
    pub quality: Option<f32>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub result_url: Option<String>,
}

impl BatchItemReport {
    pub fn new(
        outcome: &BatchOutcome,
        progress: BatchProgress,
        result_url: Option<String>,
    ) -> Self {
        let converted = outcome.outcome.as_ref().ok();
        let error = outcome.outcome.as_ref().err();
        Self {
            id: outcome.id.get(),
            completed: progress.completed,
            total: progress.total,
            converted: converted.is_some(),
            mime_type: converted.map(|c| c.format.mime_type()),
            encoded_bytes: converted.map(|c| c.byte_size),
            quality: converted.map(|c| c.quality),
            error: error.map(|e| e.to_string()),
            error_kind: error.map(|e| e.kind()),
            result_url,
        }
    }
}
