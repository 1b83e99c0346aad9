//! The caller-owned collection of items and their derived handles.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::convert::Converter;
use crate::decode::Decoder;
use crate::encode::{EncodeResult, RasterSurface};
use crate::error::ConvertError;
use crate::item::{
    Conversion, ConversionItem, ConversionRequest, ConversionTicket, ItemId, ItemState,
};
use crate::ledger::{HandleKind, HandleReleaser, NoopReleaser, ResourceLedger};
use crate::settings::TargetSize;

/// Ordered items plus the ledger of handles attached to them.
///
/// Removing an item, or clearing the set, releases that item's handles.
#[derive(Debug)]
pub struct WorkingSet<R: HandleReleaser = NoopReleaser> {
    items: Vec<ConversionItem>,
    next_id: u64,
    ledger: ResourceLedger<R>,
}

impl<R: HandleReleaser + Default> Default for WorkingSet<R> {
    fn default() -> Self {
        Self::with_releaser(R::default())
    }
}

impl WorkingSet<NoopReleaser> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: HandleReleaser> WorkingSet<R> {
    pub fn with_releaser(releaser: R) -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            ledger: ResourceLedger::new(releaser),
        }
    }

    /// Accept a source file. Decoding is deferred to its first conversion.
    pub fn add(&mut self, source_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> ItemId {
        let id = ItemId::new(self.next_id);
        self.next_id += 1;
        self.items.push(ConversionItem::new(id, source_name, bytes.into()));
        id
    }

    pub fn get(&self, id: ItemId) -> Option<&ConversionItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn position(&self, id: ItemId) -> Result<usize, ConvertError> {
        self.items
            .iter()
            .position(|item| item.id() == id)
            .ok_or(ConvertError::UnknownItem { id })
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ConversionItem> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(ConversionItem::id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items in `state`.
    pub fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|item| item.state() == state).count()
    }

    /// Remove an item and release its handles.
    ///
    /// An outstanding ticket for the item can still run, but completing it
    /// reports `UnknownItem`.
    pub fn remove(&mut self, id: ItemId) -> Option<ConversionItem> {
        let index = self.position(id).ok()?;
        let removed = self.items.remove(index);
        self.ledger.release_all(id);
        debug!(%id, "removed item");
        Some(removed)
    }

    /// Remove every item and release every handle.
    pub fn clear(&mut self) {
        for item in self.items.drain(..) {
            self.ledger.release_all(item.id());
        }
        // Handles registered for ids that were already gone
        self.ledger.clear();
    }

    /// Set or reset the custom output file name of an item.
    ///
    /// # Errors
    ///
    /// `InvalidOutputName` for blank names or names with path separators.
    pub fn set_output_name(&mut self, id: ItemId, name: Option<&str>) -> Result<(), ConvertError> {
        let name = match name.map(str::trim) {
            None => None,
            Some("") => {
                return Err(ConvertError::InvalidOutputName(
                    "name must not be empty".to_string(),
                ))
            }
            Some(name) if name.contains(['/', '\\']) => {
                return Err(ConvertError::InvalidOutputName(format!(
                    "'{}' contains a path separator",
                    name
                )))
            }
            Some(name) => Some(name.to_string()),
        };
        let index = self.position(id)?;
        self.items[index].set_output_name(name);
        Ok(())
    }

    /// Start a conversion, moving the item to `Converting`.
    ///
    /// # Errors
    ///
    /// `UnknownItem` for ids not in the set, `ConversionInProgress` if the
    /// item is already converting.
    pub fn begin_conversion(
        &mut self,
        id: ItemId,
        request: ConversionRequest,
    ) -> Result<ConversionTicket, ConvertError> {
        let index = self.position(id)?;
        self.items[index].begin(request)
    }

    /// Apply a finished conversion to its item.
    ///
    /// A failed conversion releases the item's result handle.
    ///
    /// # Errors
    ///
    /// The conversion's own error when it failed; `UnknownItem` if the item
    /// was removed meanwhile; `StaleConversion` if the ticket was abandoned
    /// or superseded.
    pub fn complete(&mut self, conversion: Conversion) -> Result<&ConversionItem, ConvertError> {
        let id = conversion.id();
        let index = self.position(id)?;
        if !self.items[index].is_awaiting(&conversion) {
            return Err(ConvertError::StaleConversion { id });
        }

        let applied = self.items[index].complete(conversion);
        if let Err(err) = &applied {
            warn!(%id, error = %err, "conversion failed");
            self.ledger.release(id, HandleKind::Result);
        }
        applied.map(|()| &self.items[index])
    }

    /// Give up on an in-flight conversion, returning its item to `Pending`.
    pub fn abandon(&mut self, ticket: &ConversionTicket) {
        if let Ok(index) = self.position(ticket.id()) {
            self.items[index].abandon(ticket);
        }
    }

    /// Begin, run and complete one conversion.
    pub fn convert_item<D: Decoder, S: RasterSurface>(
        &mut self,
        id: ItemId,
        request: ConversionRequest,
        converter: &Converter<D, S>,
    ) -> Result<&ConversionItem, ConvertError> {
        let ticket = self.begin_conversion(id, request)?;
        let conversion = converter.convert(ticket);
        self.complete(conversion)
    }

    /// Re-encode an item at a fixed quality.
    pub fn encode_at_quality<D: Decoder, S: RasterSurface>(
        &mut self,
        id: ItemId,
        quality: f32,
        converter: &Converter<D, S>,
    ) -> Result<&EncodeResult, ConvertError> {
        self.convert_item(id, ConversionRequest::quality(quality), converter)
            .and_then(converted_result)
    }

    /// Re-encode an item to fit a byte budget. The chosen quality is
    /// available from [`ConversionItem::quality`] afterwards.
    pub fn encode_to_target_size<D: Decoder, S: RasterSurface>(
        &mut self,
        id: ItemId,
        target: TargetSize,
        converter: &Converter<D, S>,
    ) -> Result<&EncodeResult, ConvertError> {
        self.convert_item(id, ConversionRequest::target(target), converter)
            .and_then(converted_result)
    }

    /// Attach a handle to an item, releasing the one it replaces.
    ///
    /// # Errors
    ///
    /// `UnknownItem` if the item isn't in the set; the handle is released
    /// immediately in that case.
    pub fn register_handle(
        &mut self,
        id: ItemId,
        kind: HandleKind,
        handle: R::Handle,
    ) -> Result<(), ConvertError> {
        if self.position(id).is_err() {
            // Never track handles for items that no longer exist
            self.ledger.register(id, kind, handle);
            self.ledger.release(id, kind);
            return Err(ConvertError::UnknownItem { id });
        }
        self.ledger.register(id, kind, handle);
        Ok(())
    }

    pub fn release_handle(&mut self, id: ItemId, kind: HandleKind) {
        self.ledger.release(id, kind);
    }

    pub fn handle(&self, id: ItemId, kind: HandleKind) -> Option<&R::Handle> {
        self.ledger.get(id, kind)
    }

    pub fn ledger(&self) -> &ResourceLedger<R> {
        &self.ledger
    }
}

fn converted_result(item: &ConversionItem) -> Result<&EncodeResult, ConvertError> {
    item.last_result()
        .ok_or_else(|| ConvertError::Unknown(format!("item {} has no result", item.id())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CompressionSettings;
    use crate::testing::{FakeDecoder, FakeSurface};

    /// Counts releases per handle value.
    #[derive(Debug, Default)]
    struct CountingReleaser {
        released: Vec<u32>,
    }

    impl HandleReleaser for CountingReleaser {
        type Handle = u32;

        fn release(&mut self, handle: u32) {
            self.released.push(handle);
        }
    }

    fn converter() -> Converter<FakeDecoder, FakeSurface> {
        Converter::new(
            FakeDecoder::new(),
            FakeSurface::new(),
            CompressionSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let mut set = WorkingSet::new();
        let a = set.add("a.png", &b"aaa"[..]);
        let b = set.add("b.png", &b"bbb"[..]);
        set.remove(a);
        let c = set.add("c.png", &b"ccc"[..]);

        assert_ne!(a, c);
        assert_eq!(set.ids(), vec![b, c]);
    }

    #[test]
    fn test_encode_at_quality_converts_item() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("photo.png", &b"pixels"[..]);

        let result = set.encode_at_quality(id, 0.6, &converter).unwrap();
        assert_eq!(result.byte_size(), FakeSurface::size_for(0.6));

        let item = set.get(id).unwrap();
        assert_eq!(item.state(), ItemState::Converted);
        assert_eq!(item.quality(), 0.6);
        assert!(item.image().is_some());
    }

    #[test]
    fn test_decoded_image_is_cached() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("photo.png", &b"pixels"[..]);

        set.encode_at_quality(id, 0.6, &converter).unwrap();
        set.encode_at_quality(id, 0.3, &converter).unwrap();
        assert_eq!(converter.decoder().calls(), 1);
    }

    #[test]
    fn test_reconversion_replaces_result() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("photo.png", &b"pixels"[..]);

        set.encode_at_quality(id, 0.9, &converter).unwrap();
        set.encode_at_quality(id, 0.2, &converter).unwrap();

        let item = set.get(id).unwrap();
        assert_eq!(item.state(), ItemState::Converted);
        assert_eq!(item.last_result().unwrap().quality, 0.2);
        assert_eq!(
            item.last_result().unwrap().byte_size(),
            FakeSurface::size_for(0.2)
        );
    }

    #[test]
    fn test_encode_to_target_size_records_quality() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("big.png", vec![0u8; 100_000]);

        let result = set
            .encode_to_target_size(id, TargetSize::from_bytes(4_000), &converter)
            .unwrap();
        assert!(result.byte_size() <= 4_000);

        let item = set.get(id).unwrap();
        assert!(item.quality() < 0.8);
        assert!(matches!(
            item.last_request(),
            Some(ConversionRequest::TargetSize { .. })
        ));
    }

    #[test]
    fn test_decode_failure_marks_failed() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("broken.png", &b"bad bytes"[..]);

        let err = set.encode_at_quality(id, 0.8, &converter).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidImage(_)));

        let item = set.get(id).unwrap();
        assert_eq!(item.state(), ItemState::Failed);
        assert!(matches!(item.last_error(), Some(ConvertError::InvalidImage(_))));
    }

    #[test]
    fn test_concurrent_conversion_on_same_item_rejected() {
        let mut set = WorkingSet::new();
        let id = set.add("photo.png", &b"pixels"[..]);

        let _ticket = set.begin_conversion(id, ConversionRequest::quality(0.5)).unwrap();
        let second = set.begin_conversion(id, ConversionRequest::quality(0.7));
        assert_eq!(second.unwrap_err(), ConvertError::ConversionInProgress { id });
    }

    #[test]
    fn test_split_conversions_on_different_items() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let a = set.add("a.png", &b"a"[..]);
        let b = set.add("b.png", &b"b"[..]);

        let ticket_a = set.begin_conversion(a, ConversionRequest::quality(0.5)).unwrap();
        let ticket_b = set.begin_conversion(b, ConversionRequest::quality(0.3)).unwrap();
        assert_eq!(set.count(ItemState::Converting), 2);

        // Finish out of order
        let done_b = converter.convert(ticket_b);
        let done_a = converter.convert(ticket_a);
        set.complete(done_b).unwrap();
        set.complete(done_a).unwrap();

        assert_eq!(set.count(ItemState::Converted), 2);
    }

    #[test]
    fn test_complete_after_remove_is_unknown_item() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("a.png", &b"a"[..]);

        let ticket = set.begin_conversion(id, ConversionRequest::quality(0.5)).unwrap();
        set.remove(id);
        let err = set.complete(converter.convert(ticket)).unwrap_err();
        assert_eq!(err, ConvertError::UnknownItem { id });
    }

    #[test]
    fn test_complete_abandoned_ticket_is_stale() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let id = set.add("a.png", &b"a"[..]);

        let ticket = set.begin_conversion(id, ConversionRequest::quality(0.5)).unwrap();
        set.abandon(&ticket);
        assert_eq!(set.get(id).unwrap().state(), ItemState::Pending);

        let err = set.complete(converter.convert(ticket)).unwrap_err();
        assert_eq!(err, ConvertError::StaleConversion { id });
        assert_eq!(set.get(id).unwrap().state(), ItemState::Pending);
    }

    #[test]
    fn test_unknown_item_operations() {
        let converter = converter();
        let mut set = WorkingSet::new();
        let missing = ItemId::new(42);

        assert_eq!(
            set.encode_at_quality(missing, 0.5, &converter).unwrap_err(),
            ConvertError::UnknownItem { id: missing }
        );
        assert!(set.remove(missing).is_none());
    }

    #[test]
    fn test_register_new_result_handle_releases_old_once() {
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let id = set.add("a.png", &b"a"[..]);

        set.register_handle(id, HandleKind::Result, 1).unwrap();
        set.register_handle(id, HandleKind::Result, 2).unwrap();

        assert_eq!(set.ledger().releaser().released, vec![1]);
        assert_eq!(set.handle(id, HandleKind::Result), Some(&2));
    }

    #[test]
    fn test_remove_releases_all_handles() {
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let id = set.add("a.png", &b"a"[..]);
        set.register_handle(id, HandleKind::Preview, 10).unwrap();
        set.register_handle(id, HandleKind::Result, 11).unwrap();

        set.remove(id);
        let mut released = set.ledger().releaser().released.clone();
        released.sort();
        assert_eq!(released, vec![10, 11]);
        assert!(set.ledger().is_empty());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let a = set.add("a.png", &b"a"[..]);
        let b = set.add("b.png", &b"b"[..]);
        set.register_handle(a, HandleKind::Preview, 1).unwrap();
        set.register_handle(b, HandleKind::Result, 2).unwrap();

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.ledger().releaser().released.len(), 2);
    }

    #[test]
    fn test_release_handle_keeps_the_other_kind() {
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let id = set.add("a.png", &b"a"[..]);
        set.register_handle(id, HandleKind::Preview, 3).unwrap();
        set.register_handle(id, HandleKind::Result, 4).unwrap();

        set.release_handle(id, HandleKind::Preview);
        set.release_handle(id, HandleKind::Preview);
        assert_eq!(set.ledger().releaser().released, vec![3]);
        assert_eq!(set.handle(id, HandleKind::Result), Some(&4));
    }

    #[test]
    fn test_register_for_unknown_item_releases_immediately() {
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let err = set.register_handle(ItemId::new(9), HandleKind::Preview, 5);

        assert_eq!(err, Err(ConvertError::UnknownItem { id: ItemId::new(9) }));
        assert_eq!(set.ledger().releaser().released, vec![5]);
        assert!(set.ledger().is_empty());
    }

    #[test]
    fn test_failed_conversion_releases_result_handle() {
        let converter = converter();
        let mut set = WorkingSet::with_releaser(CountingReleaser::default());
        let id = set.add("a.png", &b"bad"[..]);
        set.register_handle(id, HandleKind::Preview, 1).unwrap();
        set.register_handle(id, HandleKind::Result, 2).unwrap();

        let _ = set.encode_at_quality(id, 0.5, &converter);
        assert_eq!(set.ledger().releaser().released, vec![2]);
        assert!(set.handle(id, HandleKind::Preview).is_some());
    }

    #[test]
    fn test_output_name_validation() {
        let mut set = WorkingSet::new();
        let id = set.add("a.webp", &b"a"[..]);

        set.set_output_name(id, Some("  holiday.png ")).unwrap();
        assert_eq!(set.get(id).unwrap().output_name(), Some("holiday.png"));

        assert!(matches!(
            set.set_output_name(id, Some("   ")),
            Err(ConvertError::InvalidOutputName(_))
        ));
        assert!(matches!(
            set.set_output_name(id, Some("dir/x.png")),
            Err(ConvertError::InvalidOutputName(_))
        ));

        set.set_output_name(id, None).unwrap();
        assert_eq!(set.get(id).unwrap().output_name(), None);
    }
}
