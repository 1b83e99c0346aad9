//! A list of files being compressed, exposed to JavaScript.
//!
//! `JsWorkspace` owns the items and their object URLs. Every URL it hands
//! out is revoked when it is replaced, when its item is removed, or when the
//! workspace is cleared or freed.
//!
//! # Example
//!
//! ```typescript
//! import { JsWorkspace } from '@shrinkray/wasm';
//!
//! const ws = new JsWorkspace();
//! for (const file of input.files) {
//!   ws.add(file.name, new Uint8Array(await file.arrayBuffer()));
//! }
//! const summary = ws.convert_all(undefined, (done, total) => {
//!   progress.value = done / total;
//! });
//! ```
//!
//! A batch can also be driven one item at a time, so the page stays
//! responsive and a stop button takes effect before the next item:
//!
//! ```typescript
//! ws.start_convert_all(0.7);
//! stopButton.onclick = () => ws.stop_batch();
//! let report;
//! while ((report = ws.next_item()) !== undefined) {
//!   progress.value = report.completed / report.total;
//!   await new Promise(requestAnimationFrame);
//! }
//! const { converted, failed, stopped } = ws.batch_summary();
//! ```

use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use shrinkray_core::{
    export_entries, BatchMode, BatchOutcome, BatchPlan, BatchProgress, BatchSummary,
    CompressionSettings, ConversionItem, ConversionRequest, ConvertError, DefaultConverter,
    EncodeResult, HandleKind, HandleReleaser, ItemId, SizeReport, TargetSize, WorkingSet,
};
use wasm_bindgen::prelude::*;
use web_sys::{console, Blob, BlobPropertyBag, Url};

use crate::types::{BatchItemReport, ItemSnapshot, JsEncodeResult};

/// Revokes object URLs handed back by the ledger.
#[derive(Debug, Default)]
pub struct ObjectUrlReleaser;

impl HandleReleaser for ObjectUrlReleaser {
    type Handle = String;

    fn release(&mut self, url: String) {
        if let Err(err) = Url::revoke_object_url(&url) {
            console::warn_2(&JsValue::from_str("failed to revoke object URL"), &err);
        }
    }
}

fn to_js(err: ConvertError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn object_url(bytes: &[u8], mime_type: Option<&str>) -> Result<String, JsValue> {
    let parts = Array::new();
    parts.push(&Uint8Array::from(bytes));
    let options = BlobPropertyBag::new();
    if let Some(mime_type) = mime_type {
        options.set_type(mime_type);
    }
    let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    Url::create_object_url_with_blob(&blob)
}

/// The request an item is re-run with when no quality is given: whatever it
/// was last converted with, else its current quality.
fn default_request(item: &ConversionItem) -> ConversionRequest {
    item.last_request()
        .copied()
        .unwrap_or_else(|| ConversionRequest::quality(item.quality()))
}

/// Working set of images with object-URL lifecycle management.
#[wasm_bindgen]
pub struct JsWorkspace {
    set: WorkingSet<ObjectUrlReleaser>,
    converter: DefaultConverter,
    /// The current or most recent stepped batch.
    batch: Option<BatchPlan>,
}

#[wasm_bindgen]
impl JsWorkspace {
    /// Create a workspace.
    ///
    /// # Arguments
    ///
    /// * `settings` - Optional settings object, e.g.
    ///   `{ default_quality: 0.8, formats: { primary: "webp", fallback: "jpeg" } }`.
    ///   Missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<JsWorkspace, JsValue> {
        let settings = if settings.is_undefined() || settings.is_null() {
            CompressionSettings::default()
        } else {
            serde_wasm_bindgen::from_value(settings)
                .map_err(|e| JsValue::from_str(&e.to_string()))?
        };
        Self::with_settings(settings).map_err(to_js)
    }

    /// Number of items
    #[wasm_bindgen(getter)]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Current settings as a plain object.
    pub fn settings(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.converter.settings())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Add a file. Returns its id. Decoding happens on first conversion.
    pub fn add(&mut self, name: String, bytes: Vec<u8>) -> u64 {
        self.set.add(name, bytes).get()
    }

    /// Remove an item and revoke its URLs. Returns whether it existed.
    pub fn remove(&mut self, id: u64) -> bool {
        self.set.remove(ItemId::new(id)).is_some()
    }

    /// Remove every item and revoke every URL. Drops any queued batch.
    pub fn clear(&mut self) {
        self.batch = None;
        self.set.clear();
    }

    /// Re-encode one item at `quality` and publish a new result URL.
    pub fn set_quality(&mut self, id: u64, quality: f32) -> Result<JsEncodeResult, JsValue> {
        self.convert_and_publish(ItemId::new(id), ConversionRequest::quality(quality))
    }

    /// Re-encode one item to fit `target_kb` and publish a new result URL.
    /// The chosen quality is in the item snapshot afterwards.
    pub fn apply_target_kb(
        &mut self,
        id: u64,
        target_kb: f64,
    ) -> Result<JsEncodeResult, JsValue> {
        let target = TargetSize::from_kb(target_kb).map_err(to_js)?;
        self.convert_and_publish(ItemId::new(id), ConversionRequest::target(target))
    }

    /// Convert every item, in order.
    ///
    /// # Arguments
    ///
    /// * `quality` - Quality for all items; when omitted each item reuses its
    ///   last request
    /// * `on_progress` - Optional `(completed, total) => void`, called after
    ///   each item, failed ones included
    ///
    /// Returns `{ converted, failed, stopped }`.
    pub fn convert_all(
        &mut self,
        quality: Option<f32>,
        on_progress: Option<Function>,
    ) -> Result<JsValue, JsValue> {
        self.run_batch(BatchMode::All, quality, on_progress.as_ref())
    }

    /// Like `convert_all`, skipping items that already hold a result for the
    /// request they would get.
    pub fn convert_remaining(
        &mut self,
        quality: Option<f32>,
        on_progress: Option<Function>,
    ) -> Result<JsValue, JsValue> {
        self.run_batch(BatchMode::Remaining, quality, on_progress.as_ref())
    }

    /// Queue every item for a stepped batch, replacing any batch in progress.
    /// Returns the number of queued items.
    pub fn start_convert_all(&mut self, quality: Option<f32>) -> usize {
        self.start_batch(BatchMode::All, quality)
    }

    /// Like `start_convert_all`, skipping items that already hold a result
    /// for the request they would get.
    pub fn start_convert_remaining(&mut self, quality: Option<f32>) -> usize {
        self.start_batch(BatchMode::Remaining, quality)
    }

    /// Convert the next queued item and publish its result URL.
    ///
    /// Returns `{ id, completed, total, converted, mimeType, encodedBytes,
    /// quality, error, errorKind, resultUrl }`, or `undefined` once the
    /// batch is done or stopped.
    pub fn next_item(&mut self) -> Result<JsValue, JsValue> {
        let Some((outcome, progress)) = self.step_batch(&mut |_: BatchProgress| {}) else {
            return Ok(JsValue::UNDEFINED);
        };
        let result_url = self.publish_outcome(&outcome)?;
        let report = BatchItemReport::new(&outcome, progress, result_url);
        serde_wasm_bindgen::to_value(&report).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Stop the stepped batch before its next item. Queued items stay as
    /// they are.
    pub fn stop_batch(&self) {
        if let Some(batch) = &self.batch {
            batch.stop();
        }
    }

    /// `{ converted, failed, stopped }` of the current or last stepped
    /// batch, or `undefined` if none was started.
    pub fn batch_summary(&self) -> Result<JsValue, JsValue> {
        match self.batch_counts() {
            Some(summary) => serde_wasm_bindgen::to_value(&summary)
                .map_err(|e| JsValue::from_str(&e.to_string())),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Object URL of the latest result, if the item has one.
    pub fn result_url(&self, id: u64) -> Option<String> {
        self.set.handle(ItemId::new(id), HandleKind::Result).cloned()
    }

    /// Object URL of the original file, created on first request.
    pub fn register_preview(&mut self, id: u64) -> Result<String, JsValue> {
        let id = ItemId::new(id);
        if let Some(url) = self.set.handle(id, HandleKind::Preview) {
            return Ok(url.clone());
        }
        let item = self.set.get(id).ok_or_else(|| to_js(ConvertError::UnknownItem { id }))?;
        let url = object_url(item.source_bytes(), None)?;
        self.set
            .register_handle(id, HandleKind::Preview, url.clone())
            .map_err(to_js)?;
        Ok(url)
    }

    /// Revoke the preview URL of an item, if it has one.
    pub fn release_preview(&mut self, id: u64) {
        self.set.release_handle(ItemId::new(id), HandleKind::Preview);
    }

    /// Item ids, in order.
    pub fn ids(&self) -> Vec<u64> {
        self.set.ids().into_iter().map(ItemId::get).collect()
    }

    /// Set or reset (with `undefined`) a custom download name.
    pub fn set_output_name(&mut self, id: u64, name: Option<String>) -> Result<(), JsValue> {
        self.set
            .set_output_name(ItemId::new(id), name.as_deref())
            .map_err(to_js)
    }

    /// Snapshot of one item as a plain object.
    pub fn item(&self, id: u64) -> Result<JsValue, JsValue> {
        let snapshot = self.snapshot(ItemId::new(id)).map_err(to_js)?;
        serde_wasm_bindgen::to_value(&snapshot).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Snapshots of all items, in order.
    pub fn items(&self) -> Result<JsValue, JsValue> {
        let snapshots: Vec<ItemSnapshot> = self
            .set
            .iter()
            .map(|item| ItemSnapshot::new(item, self.result_url(item.id().get())))
            .collect();
        serde_wasm_bindgen::to_value(&snapshots).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Converted files as `{ name, mimeType, bytes }` objects for a ZIP
    /// writer. Names are unique.
    pub fn export_entries(&self) -> Result<Array, JsValue> {
        let entries = Array::new();
        for entry in export_entries(&self.set, self.converter.settings()) {
            let obj = Object::new();
            Reflect::set(&obj, &"name".into(), &entry.name.into())?;
            Reflect::set(&obj, &"mimeType".into(), &entry.format.mime_type().into())?;
            Reflect::set(&obj, &"bytes".into(), &Uint8Array::from(&entry.bytes[..]))?;
            entries.push(&obj);
        }
        Ok(entries)
    }

    /// Size summary for one item, or the whole workspace when `id` is
    /// omitted, e.g. `Original: 1.00 MB | Compressed: 200.00 KB (-80%)`.
    pub fn stats(&self, id: Option<u64>) -> String {
        self.size_report(id.map(ItemId::new)).to_string()
    }
}

impl JsWorkspace {
    pub(crate) fn with_settings(settings: CompressionSettings) -> Result<Self, ConvertError> {
        Ok(Self {
            set: WorkingSet::default(),
            converter: DefaultConverter::with_settings(settings)?,
            batch: None,
        })
    }

    fn convert(
        &mut self,
        id: ItemId,
        request: ConversionRequest,
    ) -> Result<EncodeResult, ConvertError> {
        let item = self.set.convert_item(id, request, &self.converter)?;
        item.last_result()
            .cloned()
            .ok_or_else(|| ConvertError::Unknown(format!("item {} has no result", id)))
    }

    fn convert_and_publish(
        &mut self,
        id: ItemId,
        request: ConversionRequest,
    ) -> Result<JsEncodeResult, JsValue> {
        let result = self.convert(id, request).map_err(to_js)?;
        self.publish_result(id, &result)?;
        Ok(result.into())
    }

    /// Register a fresh object URL for `result`, revoking the previous one.
    fn publish_result(&mut self, id: ItemId, result: &EncodeResult) -> Result<(), JsValue> {
        let url = object_url(result.bytes(), Some(result.format.mime_type()))?;
        self.set
            .register_handle(id, HandleKind::Result, url)
            .map_err(to_js)
    }

    /// Publish the result URL of a converted outcome. Returns the URL.
    fn publish_outcome(&mut self, outcome: &BatchOutcome) -> Result<Option<String>, JsValue> {
        if outcome.outcome.is_err() {
            return Ok(None);
        }
        let result = self
            .set
            .get(outcome.id)
            .and_then(|item| item.last_result())
            .cloned();
        match result {
            Some(result) => {
                self.publish_result(outcome.id, &result)?;
                Ok(self.result_url(outcome.id.get()))
            }
            None => Ok(None),
        }
    }

    fn start_batch(&mut self, mode: BatchMode, quality: Option<f32>) -> usize {
        let builder = move |item: &ConversionItem| match quality {
            Some(q) => ConversionRequest::quality(q),
            None => default_request(item),
        };
        if let Some(previous) = self.batch.take() {
            previous.stop();
        }
        let plan = BatchPlan::new(mode, &self.set, builder);
        let total = plan.total();
        self.batch = Some(plan);
        total
    }

    /// Convert the next item of the stored batch without touching JS.
    fn step_batch<P: FnMut(BatchProgress)>(
        &mut self,
        on_progress: &mut P,
    ) -> Option<(BatchOutcome, BatchProgress)> {
        let batch = self.batch.as_mut()?;
        let outcome = batch.step(&mut self.set, &self.converter, on_progress)?;
        let progress = BatchProgress {
            completed: batch.completed(),
            total: batch.total(),
        };
        Some((outcome, progress))
    }

    fn batch_counts(&self) -> Option<BatchSummary> {
        self.batch.as_ref().map(BatchPlan::summary)
    }

    /// Run a whole batch, publishing each result URL as its item finishes.
    fn run_batch(
        &mut self,
        mode: BatchMode,
        quality: Option<f32>,
        on_progress: Option<&Function>,
    ) -> Result<JsValue, JsValue> {
        let mut report = |progress: BatchProgress| {
            if let Some(callback) = on_progress {
                let completed = JsValue::from_f64(progress.completed as f64);
                let total = JsValue::from_f64(progress.total as f64);
                if let Err(err) = callback.call2(&JsValue::NULL, &completed, &total) {
                    console::warn_2(&JsValue::from_str("progress callback failed"), &err);
                }
            }
        };

        self.start_batch(mode, quality);
        while let Some((outcome, _)) = self.step_batch(&mut report) {
            self.publish_outcome(&outcome)?;
        }
        let summary = self.batch_counts().unwrap_or_default();
        serde_wasm_bindgen::to_value(&summary).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    fn snapshot(&self, id: ItemId) -> Result<ItemSnapshot, ConvertError> {
        let item = self.set.get(id).ok_or(ConvertError::UnknownItem { id })?;
        Ok(ItemSnapshot::new(item, self.result_url(id.get())))
    }

    fn size_report(&self, id: Option<ItemId>) -> SizeReport {
        match id {
            Some(id) => self
                .set
                .get(id)
                .and_then(|item| {
                    item.last_result().map(|result| {
                        SizeReport::new(item.original_byte_size(), result.byte_size())
                    })
                })
                .unwrap_or_default(),
            None => SizeReport::for_set(&self.set),
        }
    }
}
