//! PDF Document - the object resolution engine.
//!
//! Objects are located in three tiers, stopping at the first success:
//!
//! 1. an in-use index entry: parse the indirect object at its offset;
//! 2. a compressed index entry: locate and unpack the containing object
//!    stream, then look again;
//! 3. a sequential scan of the body from a persisted cursor until the
//!    object has been seen.
//!
//! Anything still missing afterwards is registered as null and logged, so
//! one corrupt object never aborts resolution of the rest of the document.

use super::factory::{DomainObject, Node, ObjectFactory, TypeFactory};
use super::registry::Registry;
use super::xref::{Header, Trailer, XRefLoader, XRefSection, find_startxref};
use crate::codec::{FilterDecoder, StreamDecoder};
use crate::config::ParseOptions;
use crate::error::{PdfError, Result};
use crate::model::objects::{IndirectObject, PDFObjRef, PDFObject};
use crate::parser::pdf_parser::{BodyElement, PDFParser, ParserState};
use bytes::Bytes;
use memmap2::Mmap;
use regex::bytes::Regex;
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

/// PDF Document - locates, memoizes and builds the objects of one source.
///
/// All lookups reposition a single parser, so resolution takes `&mut self`.
pub struct PDFDocument {
    parser: PDFParser,
    registry: Registry,
    header: Option<Header>,
    trailer: Trailer,
    options: ParseOptions,
    decoder: Box<dyn StreamDecoder>,
    factory: Box<dyn ObjectFactory>,
    /// Where the body scan resumes.
    scan_cursor: ParserState,
    scan_exhausted: bool,
    /// Object streams already unpacked into the registry.
    unpacked: FxHashSet<u32>,
    /// Keys currently being located, to stop container loops.
    locating: FxHashSet<PDFObjRef>,
    object_header: Option<Regex>,
}

impl std::fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFDocument")
            .field("header", &self.header)
            .field("root", &self.trailer.root)
            .field("xrefs", &self.trailer.xrefs.len())
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl PDFDocument {
    /// Open a document from owned or borrowed bytes (copied).
    pub fn new<D: AsRef<[u8]>>(data: D) -> Result<Self> {
        Self::new_with_options(data, ParseOptions::default())
    }

    pub fn new_with_options<D: AsRef<[u8]>>(data: D, options: ParseOptions) -> Result<Self> {
        Self::from_bytes_with_options(Bytes::copy_from_slice(data.as_ref()), options)
    }

    /// Open a document from shared bytes without copying them.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    pub fn from_bytes_with_options(data: Bytes, options: ParseOptions) -> Result<Self> {
        Self::open_inner(data, options, Box::new(FilterDecoder))
    }

    /// Memory-map the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and owned by the returned Bytes.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes_with_options(Bytes::from_owner(mmap), options)
    }

    /// Open with a caller-supplied decoder, which is also used to read
    /// cross-reference streams during opening.
    pub fn from_bytes_with_decoder(
        data: Bytes,
        options: ParseOptions,
        decoder: impl StreamDecoder + 'static,
    ) -> Result<Self> {
        Self::open_inner(data, options, Box::new(decoder))
    }

    /// Replace the decoder used for object streams from now on.
    pub fn with_decoder(mut self, decoder: impl StreamDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Replace the factory applied to dictionaries and streams.
    pub fn with_factory(mut self, factory: impl ObjectFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    fn open_inner(
        data: Bytes,
        options: ParseOptions,
        decoder: Box<dyn StreamDecoder>,
    ) -> Result<Self> {
        let header = Header::find(&data, options.header_search_window);
        if header.is_none() {
            tracing::warn!("no %PDF- header found, scanning from offset 0");
        }
        let body_start = header.as_ref().map_or(0, |h| h.body_start);

        let object_header = if options.resync {
            Some(
                Regex::new(r"(\d+)\s+(\d+)\s+obj\b")
                    .map_err(|e| PdfError::SyntaxError(e.to_string()))?,
            )
        } else {
            None
        };

        let mut parser = PDFParser::new(data.clone());
        parser.reset(body_start);
        let scan_cursor = parser.get_state();

        let mut doc = Self {
            parser,
            registry: Registry::new(),
            header,
            trailer: Trailer {
                root: PDFObjRef::new(0, 0),
                info: None,
                attrs: HashMap::new(),
                xrefs: Vec::new(),
            },
            options,
            decoder,
            factory: Box::new(TypeFactory),
            scan_cursor,
            scan_exhausted: false,
            unpacked: FxHashSet::default(),
            locating: FxHashSet::default(),
            object_header,
        };

        doc.trailer.xrefs = doc.load_xrefs(&data);

        let mut attrs = HashMap::new();
        for section in &doc.trailer.xrefs {
            for (key, value) in &section.trailer {
                attrs.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if !attrs.contains_key("Root")
            && let Some(last) = doc.last_trailer(&data)
        {
            tracing::debug!("using last trailer dictionary in file");
            for (key, value) in last {
                attrs.entry(key).or_insert(value);
            }
        }

        let root = match attrs.get("Root").and_then(|r| r.as_ref().ok()) {
            Some(r) => *r,
            None => doc
                .find_catalog()
                .ok_or_else(|| PdfError::SyntaxError("no document root found".into()))?,
        };
        doc.trailer.info = attrs.get("Info").and_then(|r| r.as_ref().ok()).copied();
        doc.trailer.root = root;
        doc.trailer.attrs = attrs;
        Ok(doc)
    }

    fn load_xrefs(&mut self, data: &[u8]) -> Vec<XRefSection> {
        let start = match find_startxref(data) {
            Ok(pos) => pos,
            Err(e) => {
                tracing::debug!(error = %e, "no usable startxref");
                return Vec::new();
            }
        };
        let mut loader = XRefLoader {
            parser: &mut self.parser,
            registry: &mut self.registry,
            decoder: self.decoder.as_ref(),
        };
        match loader.load_chain(start) {
            Ok(sections) => sections,
            Err(e) => {
                tracing::debug!(offset = start, error = %e, "xref chain unreadable");
                Vec::new()
            }
        }
    }

    fn last_trailer(&mut self, data: &[u8]) -> Option<HashMap<String, PDFObject>> {
        let pos = data.windows(7).rposition(|w| w == b"trailer")?;
        self.parser.reset(pos);
        self.parser.trailer().ok()
    }

    /// Scan the whole body and pick the first `/Type /Catalog` dictionary.
    fn find_catalog(&mut self) -> Option<PDFObjRef> {
        while !self.scan_exhausted {
            if let Err(e) = self.brute_force_step() {
                tracing::debug!(error = %e, "body scan stopped while searching for catalog");
                break;
            }
        }
        self.registry.keys().into_iter().find(|r| {
            self.registry
                .get_shared(r.objid, r.genno)
                .and_then(|obj| obj.attrs())
                .and_then(|attrs| attrs.get("Type"))
                .and_then(|t| t.as_name().ok())
                == Some("Catalog")
        })
    }

    pub const fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub const fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub const fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Reference to the document catalog.
    pub const fn root(&self) -> PDFObjRef {
        self.trailer.root
    }

    /// The document catalog, passed through the factory.
    pub fn catalog(&mut self) -> Node {
        self.obj_by_ref(self.trailer.root)
    }

    /// Locate `(objid, genno)`, registering it on first success.
    ///
    /// Never fails: an object that cannot be found anywhere resolves to null.
    pub fn locate_object(&mut self, objid: u32, genno: u32) -> Arc<PDFObject> {
        match self.find_object(objid, genno) {
            Ok(obj) => obj,
            Err(e) => {
                tracing::warn!(objid, genno, error = %e, "object unresolvable, substituting null");
                self.registry
                    .register(IndirectObject::new(objid, genno, PDFObject::Null))
            }
        }
    }

    fn find_object(&mut self, objid: u32, genno: u32) -> Result<Arc<PDFObject>> {
        if let Some(obj) = self.registry.get_shared(objid, genno) {
            return Ok(Arc::clone(obj));
        }
        let key = PDFObjRef::new(objid, genno);
        if !self.locating.insert(key) {
            return Err(PdfError::SyntaxError(format!(
                "object {} is needed to locate itself",
                key
            )));
        }
        let result = self.find_unregistered(objid, genno);
        self.locating.remove(&key);
        result
    }

    fn find_unregistered(&mut self, objid: u32, genno: u32) -> Result<Arc<PDFObject>> {
        for i in 0..self.trailer.xrefs.len() {
            if let Some(offset) = self.trailer.xrefs[i].in_use(objid, genno) {
                self.parser.reset(offset);
                match self.parser.indirect_object(&mut self.registry) {
                    Ok(found) if found.objid == objid && found.genno == genno => {}
                    Ok(found) => {
                        tracing::debug!(objid, genno, offset, %found, "xref offset holds another object")
                    }
                    Err(e) => {
                        tracing::debug!(objid, genno, offset, error = %e, "xref offset unparsable")
                    }
                }
                if let Some(obj) = self.registry.get_shared(objid, genno) {
                    return Ok(Arc::clone(obj));
                }
            }

            if let Some((container, _)) = self.trailer.xrefs[i].compressed(objid, genno) {
                let unpacked = self
                    .find_object(container, 0)
                    .and_then(|stream| self.unpack_object_stream(container, &stream));
                if let Err(e) = unpacked {
                    tracing::debug!(objid, container, error = %e, "object stream unusable");
                }
                if let Some(obj) = self.registry.get_shared(objid, genno) {
                    return Ok(Arc::clone(obj));
                }
            }
        }

        if !self.options.brute_force {
            return Err(PdfError::ObjectNotFound { objid, genno });
        }
        loop {
            if let Some(obj) = self.registry.get_shared(objid, genno) {
                return Ok(Arc::clone(obj));
            }
            if self.scan_exhausted {
                return Err(PdfError::ObjectNotFound { objid, genno });
            }
            self.brute_force_step()?;
        }
    }

    /// Parse the next top-level body element at the scan cursor and
    /// persist the new cursor.
    fn brute_force_step(&mut self) -> Result<()> {
        self.parser.set_state(self.scan_cursor);
        self.parser.maybe_spaces_or_comments();
        if self.parser.current().is_none() {
            self.scan_exhausted = true;
            return Ok(());
        }
        let start = self.parser.tell();

        match self.parser.body_element(&mut self.registry) {
            Ok(element) => {
                self.scan_cursor = self.parser.get_state();
                if let BodyElement::Object(r) = element
                    && let Some(obj) = self.registry.get_shared(r.objid, r.genno)
                    && obj.as_stream().is_ok_and(|s| s.type_name() == Some("ObjStm"))
                {
                    let obj = Arc::clone(obj);
                    if let Err(e) = self.unpack_object_stream(r.objid, &obj) {
                        tracing::debug!(container = r.objid, error = %e, "object stream unusable");
                    }
                }
                Ok(())
            }
            Err(e) => match self.next_object_header(start + 1) {
                Some(next) => {
                    tracing::debug!(from = start, to = next, error = %e, "resyncing body scan");
                    self.parser.reset(next);
                    self.scan_cursor = self.parser.get_state();
                    Ok(())
                }
                None => Err(e),
            },
        }
    }

    fn next_object_header(&self, from: usize) -> Option<usize> {
        let re = self.object_header.as_ref()?;
        let data = self.parser.bytes();
        if from >= data.len() {
            return None;
        }
        re.find_at(data, from).map(|m| m.start())
    }

    /// Register every object held by the object stream `container`.
    /// Each container is unpacked at most once.
    fn unpack_object_stream(&mut self, container: u32, obj: &PDFObject) -> Result<()> {
        let stream = obj.as_stream()?;
        if stream.type_name() != Some("ObjStm") {
            return Err(PdfError::SyntaxError(format!(
                "object {} is not an object stream",
                container
            )));
        }
        if !self.unpacked.insert(container) {
            return Ok(());
        }

        let count = stream
            .get("N")
            .ok_or_else(|| PdfError::SyntaxError("missing N in ObjStm".into()))?
            .as_int()?;
        let first = stream
            .get("First")
            .ok_or_else(|| PdfError::SyntaxError("missing First in ObjStm".into()))?
            .as_int()?;
        let first = usize::try_from(first)
            .map_err(|_| PdfError::SyntaxError("negative First in ObjStm".into()))?;

        let data = self.decoder.decode(stream)?;
        let mut parser = PDFParser::new(data);

        let mut slots = Vec::new();
        for _ in 0..count.max(0) {
            parser.maybe_spaces_or_comments();
            let objid = parser.non_negative_int()?;
            parser.maybe_spaces_or_comments();
            let offset = parser.non_negative_int()?;
            slots.push((objid, offset));
        }

        for (objid, offset) in slots {
            let Ok(objid) = u32::try_from(objid) else {
                continue;
            };
            let Some(start) = usize::try_from(offset)
                .ok()
                .and_then(|offset| first.checked_add(offset))
            else {
                tracing::debug!(container, objid, offset, "object stream slot offset out of range");
                continue;
            };
            parser.reset(start);
            parser.maybe_spaces_or_comments();
            match parser.object() {
                Ok(value) => {
                    self.registry.register(IndirectObject::new(objid, 0, value));
                }
                Err(e) => {
                    tracing::debug!(container, objid, error = %e, "bad object stream slot")
                }
            }
        }
        Ok(())
    }

    /// Locate a referenced object and pass it through the factory.
    /// Nested references are left in place.
    pub fn obj_by_ref(&mut self, reference: PDFObjRef) -> Node {
        let obj = self.locate_object(reference.objid, reference.genno);
        self.wrap(&obj)
    }

    /// Follow a chain of references for at most `max_depth` hops.
    pub fn deep_obj_by_ref(&mut self, value: &PDFObject, max_depth: usize) -> Result<Arc<PDFObject>> {
        let mut reference = match value {
            PDFObject::Ref(r) => *r,
            other => return Ok(Arc::new(other.clone())),
        };
        for _ in 0..max_depth {
            let obj = self.locate_object(reference.objid, reference.genno);
            match &*obj {
                PDFObject::Ref(next) => reference = *next,
                _ => return Ok(obj),
            }
        }
        Err(PdfError::DepthExceeded(max_depth))
    }

    /// [`deep_obj_by_ref`](Self::deep_obj_by_ref) with the configured depth.
    pub fn deep_obj_by_ref_default(&mut self, value: &PDFObject) -> Result<Arc<PDFObject>> {
        self.deep_obj_by_ref(value, self.options.max_depth)
    }

    /// Replace references reachable from `value` with their objects.
    ///
    /// Arrays are always expanded. Dictionary and stream entries are only
    /// expanded when `lazy` is false; either way the mapping goes through
    /// the factory. A reference already on the current path is left as is.
    pub fn build(&mut self, value: &PDFObject, lazy: bool) -> Node {
        self.build_with(value, &mut Vec::new(), lazy)
    }

    /// [`build`](Self::build) with an explicit set of references already
    /// on the path.
    pub fn build_with(&mut self, value: &PDFObject, visited: &mut Vec<PDFObjRef>, lazy: bool) -> Node {
        tracing::trace!(kind = value.type_name(), depth = visited.len(), lazy, "build");
        match value {
            PDFObject::Ref(r) => {
                if visited.contains(r) {
                    return Node::Object(PDFObject::Ref(*r));
                }
                let mut path = PathGuard::push(visited, *r);
                let target = self.locate_object(r.objid, r.genno);
                self.build_with(&target, &mut path, lazy)
            }
            PDFObject::Array(items) => Node::Array(
                items
                    .iter()
                    .map(|item| self.build_with(item, visited, lazy))
                    .collect(),
            ),
            PDFObject::Dict(attrs) => Node::Dict(Box::new(self.make(attrs, None, visited, lazy))),
            PDFObject::Stream(stream) => Node::Dict(Box::new(self.make(
                &stream.attrs,
                Some(stream.rawdata_bytes()),
                visited,
                lazy,
            ))),
            PDFObject::Indirect(inner) => {
                tracing::warn!(
                    objid = inner.objid,
                    genno = inner.genno,
                    "framed indirect object met during build"
                );
                self.build_with(&inner.value, visited, lazy)
            }
            other => Node::Object(other.clone()),
        }
    }

    /// Expand one deferred entry of a lazily built object.
    pub fn expand(&mut self, obj: &DomainObject, key: &str) -> Option<Node> {
        match obj.get(key)? {
            Node::Object(value) => Some(self.build(value, true)),
            built => Some(built.clone()),
        }
    }

    fn make(
        &mut self,
        attrs: &HashMap<String, PDFObject>,
        data: Option<Bytes>,
        visited: &mut Vec<PDFObjRef>,
        lazy: bool,
    ) -> DomainObject {
        let attrs = attrs
            .iter()
            .map(|(key, value)| {
                let node = if lazy {
                    Node::Object(value.clone())
                } else {
                    self.build_with(value, visited, lazy)
                };
                (key.clone(), node)
            })
            .collect();
        self.factory.make(attrs, data)
    }

    /// Factory view of a value without resolving anything.
    fn wrap(&self, value: &PDFObject) -> Node {
        let shallow = |attrs: &HashMap<String, PDFObject>| -> HashMap<String, Node> {
            attrs
                .iter()
                .map(|(k, v)| (k.clone(), Node::Object(v.clone())))
                .collect()
        };
        match value {
            PDFObject::Dict(attrs) => Node::Dict(Box::new(self.factory.make(shallow(attrs), None))),
            PDFObject::Stream(stream) => Node::Dict(Box::new(
                self.factory
                    .make(shallow(&stream.attrs), Some(stream.rawdata_bytes())),
            )),
            PDFObject::Array(items) => {
                Node::Array(items.iter().cloned().map(Node::Object).collect())
            }
            other => Node::Object(other.clone()),
        }
    }
}

/// Keeps a reference on the build path for as long as it is alive.
struct PathGuard<'a> {
    path: &'a mut Vec<PDFObjRef>,
}

impl<'a> PathGuard<'a> {
    fn push(path: &'a mut Vec<PDFObjRef>, reference: PDFObjRef) -> Self {
        path.push(reference);
        Self { path }
    }
}

impl Deref for PathGuard<'_> {
    type Target = Vec<PDFObjRef>;

    fn deref(&self) -> &Self::Target {
        self.path
    }
}

impl DerefMut for PathGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.path
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.path.pop();
    }
}
