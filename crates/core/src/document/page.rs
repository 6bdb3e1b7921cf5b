//! Page tree walk.
//!
//! `pages()` descends from the catalog's `/Pages` node depth-first through
//! `/Kids`. Leaves get the inheritable attributes of their ancestors
//! copied in when they do not define them themselves.

use super::catalog::PDFDocument;
use super::xref::XRefEntry;
use crate::error::Result;
use crate::model::objects::{PDFObjRef, PDFObject};
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use std::sync::Arc;

const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A page leaf with inherited attributes applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Reference of the page object; `None` for a page dictionary given
    /// inline in its parent's `/Kids`.
    pub pageid: Option<PDFObjRef>,
    pub attrs: HashMap<String, PDFObject>,
}

impl Page {
    /// Page rotation normalised to `0..360`.
    pub fn rotate(&self) -> i64 {
        self.attrs
            .get("Rotate")
            .and_then(|r| r.as_int().ok())
            .map_or(0, |r| r.rem_euclid(360))
    }

    pub fn resources(&self) -> Option<&PDFObject> {
        self.attrs.get("Resources")
    }

    pub fn mediabox(&self, doc: &mut PDFDocument) -> Option<[f64; 4]> {
        parse_box(self.attrs.get("MediaBox")?, doc)
    }

    /// Crop box, defaulting to the media box.
    pub fn cropbox(&self, doc: &mut PDFDocument) -> Option<[f64; 4]> {
        match self.attrs.get("CropBox") {
            Some(obj) => parse_box(obj, doc),
            None => self.mediabox(doc),
        }
    }
}

fn parse_box(obj: &PDFObject, doc: &mut PDFDocument) -> Option<[f64; 4]> {
    let resolved = doc.deep_obj_by_ref_default(obj).ok()?;
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = match item {
            PDFObject::Ref(_) => doc.deep_obj_by_ref_default(item).ok()?.as_num().ok()?,
            direct => direct.as_num().ok()?,
        };
    }
    Some(out)
}

/// Inheritable attributes of one tree node, chained to its ancestors.
#[derive(Debug)]
struct InheritedNode {
    parent: Option<Arc<InheritedNode>>,
    attrs: HashMap<&'static str, PDFObject>,
}

impl InheritedNode {
    fn from_dict(parent: Option<Arc<Self>>, dict: &HashMap<String, PDFObject>) -> Arc<Self> {
        let attrs = INHERITABLE
            .iter()
            .filter_map(|key| dict.get(*key).map(|v| (*key, v.clone())))
            .collect();
        Arc::new(Self { parent, attrs })
    }

    fn resolve(&self, key: &str) -> Option<&PDFObject> {
        self.attrs
            .get(key)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve(key)))
    }

    fn apply_to(&self, dest: &mut HashMap<String, PDFObject>) {
        for key in INHERITABLE {
            if !dest.contains_key(key)
                && let Some(value) = self.resolve(key)
            {
                dest.insert(key.to_string(), value.clone());
            }
        }
    }
}

impl PDFDocument {
    /// Every page leaf in document order.
    ///
    /// Falls back to all indexed `/Type /Page` objects when the tree
    /// yields nothing.
    pub fn pages(&mut self) -> Result<Vec<Page>> {
        let mut pages = self.collect_from_page_tree()?;
        if pages.is_empty() {
            pages = self.collect_from_index();
        }
        Ok(pages)
    }

    fn collect_from_page_tree(&mut self) -> Result<Vec<Page>> {
        let root = PDFObject::Ref(self.root());
        let catalog = self.deep_obj_by_ref_default(&root)?;
        let Some(tree) = catalog.attrs().and_then(|c| c.get("Pages")).cloned() else {
            return Ok(Vec::new());
        };

        let mut stack = vec![(tree, None::<Arc<InheritedNode>>)];
        let mut visited = FxHashSet::default();
        let mut pages = Vec::new();

        while let Some((node, inherited)) = stack.pop() {
            let pageid = node.as_ref().ok().copied();
            if let Some(r) = pageid
                && !visited.insert(r)
            {
                tracing::debug!(%r, "page tree node visited twice");
                continue;
            }

            let obj = self.deep_obj_by_ref_default(&node)?;
            let Some(dict) = obj.attrs() else {
                continue;
            };
            let kind = dict.get("Type").and_then(|t| t.as_name().ok());
            let is_tree = match kind {
                Some("Pages") => true,
                Some(_) => false,
                None => dict.contains_key("Kids"),
            };

            if is_tree {
                let node_inherited = InheritedNode::from_dict(inherited, dict);
                let Some(kids) = dict.get("Kids") else {
                    continue;
                };
                let kids = self.deep_obj_by_ref_default(kids)?;
                if let Ok(kids) = kids.as_array() {
                    for kid in kids.iter().rev() {
                        stack.push((kid.clone(), Some(Arc::clone(&node_inherited))));
                    }
                }
            } else {
                let mut attrs = dict.clone();
                if let Some(inherited) = &inherited {
                    inherited.apply_to(&mut attrs);
                }
                pages.push(Page { pageid, attrs });
            }
        }

        Ok(pages)
    }

    fn collect_from_index(&mut self) -> Vec<Page> {
        let mut candidates: Vec<PDFObjRef> = Vec::new();
        for section in &self.trailer().xrefs {
            for objid in section.objids() {
                let genno = match section.get(objid) {
                    Some(XRefEntry::InUse { genno, .. }) => *genno,
                    Some(XRefEntry::Compressed { .. }) => 0,
                    _ => continue,
                };
                candidates.push(PDFObjRef::new(objid, genno));
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        let mut pages = Vec::new();
        for r in candidates {
            let obj = self.locate_object(r.objid, r.genno);
            if let Some(dict) = obj.attrs()
                && dict.get("Type").and_then(|t| t.as_name().ok()) == Some("Page")
            {
                pages.push(Page {
                    pageid: Some(r),
                    attrs: dict.clone(),
                });
            }
        }
        pages
    }
}
