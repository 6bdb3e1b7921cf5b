//! Object registry - the append-only memo of located objects.

use crate::error::{PdfError, Result};
use crate::model::objects::{IndirectObject, PDFObjRef, PDFObject};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Resolved objects of one document session, keyed by `(objid, genno)`.
///
/// Entries are never removed or replaced: registering a key twice keeps
/// the first value.
#[derive(Debug, Default)]
pub struct Registry {
    objects: FxHashMap<PDFObjRef, Arc<PDFObject>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `obj` under its own identity and return the canonical entry.
    pub fn register(&mut self, obj: IndirectObject) -> Arc<PDFObject> {
        let key = obj.reference();
        Arc::clone(
            self.objects
                .entry(key)
                .or_insert_with(|| Arc::new(obj.value)),
        )
    }

    pub fn is_registered(&self, objid: u32, genno: u32) -> bool {
        self.objects.contains_key(&PDFObjRef::new(objid, genno))
    }

    /// Registered value, or `ObjectNotFound`.
    pub fn get(&self, objid: u32, genno: u32) -> Result<Arc<PDFObject>> {
        self.get_shared(objid, genno)
            .map(Arc::clone)
            .ok_or(PdfError::ObjectNotFound { objid, genno })
    }

    /// Borrow a registered value without failing.
    pub fn get_shared(&self, objid: u32, genno: u32) -> Option<&Arc<PDFObject>> {
        self.objects.get(&PDFObjRef::new(objid, genno))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Registered keys, in ascending order.
    pub fn keys(&self) -> Vec<PDFObjRef> {
        let mut keys: Vec<_> = self.objects.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}
