//! Tracking of externally visible handles derived from items.
//!
//! The UI layer attaches transient handles (object URLs, texture ids, ...) to
//! items. The ledger keeps at most one live handle per item and kind, and
//! hands every handle back to its [`HandleReleaser`] exactly once: when it is
//! replaced, released explicitly, or its item goes away.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::item::ItemId;

/// What a handle is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    /// The original source, for side-by-side preview.
    Preview,
    /// The latest encoded result.
    Result,
}

impl HandleKind {
    pub const ALL: [HandleKind; 2] = [HandleKind::Preview, HandleKind::Result];
}

/// Frees handles on behalf of the ledger.
pub trait HandleReleaser {
    type Handle;

    /// Release a handle. Called once per registered handle.
    fn release(&mut self, handle: Self::Handle);
}

/// Releaser for handles that need no cleanup.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReleaser;

impl HandleReleaser for NoopReleaser {
    type Handle = ();

    fn release(&mut self, _handle: ()) {}
}

/// Current handles per `(item, kind)`.
pub struct ResourceLedger<R: HandleReleaser> {
    releaser: R,
    entries: HashMap<(ItemId, HandleKind), R::Handle>,
}

impl<R: HandleReleaser> ResourceLedger<R> {
    pub fn new(releaser: R) -> Self {
        Self {
            releaser,
            entries: HashMap::new(),
        }
    }

    /// Store `handle` as the current one for `(id, kind)`.
    ///
    /// A previous handle for the same slot is released before the new one is
    /// stored.
    pub fn register(&mut self, id: ItemId, kind: HandleKind, handle: R::Handle) {
        if let Some(previous) = self.entries.remove(&(id, kind)) {
            trace!(%id, ?kind, "replacing handle");
            self.releaser.release(previous);
        }
        trace!(%id, ?kind, "registered handle");
        self.entries.insert((id, kind), handle);
    }

    /// Release the handle for `(id, kind)`, if any.
    pub fn release(&mut self, id: ItemId, kind: HandleKind) {
        if let Some(handle) = self.entries.remove(&(id, kind)) {
            trace!(%id, ?kind, "released handle");
            self.releaser.release(handle);
        }
    }

    /// Release every handle of an item. Absent kinds are skipped.
    pub fn release_all(&mut self, id: ItemId) {
        for kind in HandleKind::ALL {
            self.release(id, kind);
        }
    }

    /// Release every handle of every item.
    pub fn clear(&mut self) {
        for (_, handle) in self.entries.drain() {
            self.releaser.release(handle);
        }
    }

    pub fn get(&self, id: ItemId, kind: HandleKind) -> Option<&R::Handle> {
        self.entries.get(&(id, kind))
    }

    pub fn contains(&self, id: ItemId, kind: HandleKind) -> bool {
        self.entries.contains_key(&(id, kind))
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn releaser(&self) -> &R {
        &self.releaser
    }
}

impl<R: HandleReleaser + Default> Default for ResourceLedger<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<R: HandleReleaser> fmt::Debug for ResourceLedger<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("live_handles", &self.entries.len())
            .finish()
    }
}

impl<R: HandleReleaser> Drop for ResourceLedger<R> {
    fn drop(&mut self) {
        self.clear();
    }
}
