//! Shrinkray WASM - WebAssembly bindings for Shrinkray
//!
//! This crate provides WASM bindings to expose the shrinkray-core
//! functionality to JavaScript/TypeScript applications.
//!
//! # Module Structure
//!
//! - `types` - WASM-compatible wrapper types for results and item snapshots
//! - `encode` - One-shot encoding bindings (fixed quality, target size)
//! - `workspace` - A managed list of files with batch conversion and
//!   object-URL lifecycle
//!
//! # Usage
//!
//! ```typescript
//! import init, { encode_at_quality } from '@shrinkray/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const result = encode_at_quality(bytes, 0.8);
//! console.log(`Encoded ${result.byte_length} bytes as ${result.mime_type}`);
//! ```

use wasm_bindgen::prelude::*;

mod encode;
mod types;
mod workspace;

// Re-export public types
pub use encode::{encode_at_quality, encode_to_target_kb};
pub use types::{ItemSnapshot, JsEncodeResult};
pub use workspace::{JsWorkspace, ObjectUrlReleaser};

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
