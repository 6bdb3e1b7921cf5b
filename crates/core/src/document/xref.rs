//! Cross-reference index: entries, sections, trailer, header, and loading
//! of the section chain from `startxref`.

use super::registry::Registry;
use crate::codec::StreamDecoder;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};
use crate::parser::lexer::Keyword;
use crate::parser::pdf_parser::PDFParser;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;

/// One index row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object stored at a byte offset.
    InUse { offset: usize, genno: u32 },
    /// Free slot.
    Free { genno: u32 },
    /// Object stored inside the object stream `container`, at slot `index`.
    /// Compressed objects always have generation 0.
    Compressed { container: u32, index: usize },
}

/// One index section, either a classic table or a cross-reference stream,
/// together with the trailer dictionary that accompanied it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefSection {
    entries: FxHashMap<u32, XRefEntry>,
    pub trailer: HashMap<String, PDFObject>,
}

impl XRefSection {
    /// Add a row. Within a section the first row for an object wins.
    pub fn insert(&mut self, objid: u32, entry: XRefEntry) {
        self.entries.entry(objid).or_insert(entry);
    }

    pub fn get(&self, objid: u32) -> Option<&XRefEntry> {
        self.entries.get(&objid)
    }

    /// Offset of an in-use entry matching both identity fields.
    pub fn in_use(&self, objid: u32, genno: u32) -> Option<usize> {
        match self.entries.get(&objid) {
            Some(XRefEntry::InUse { offset, genno: g }) if *g == genno => Some(*offset),
            _ => None,
        }
    }

    /// Container and slot of a compressed entry matching `genno`.
    pub fn compressed(&self, objid: u32, genno: u32) -> Option<(u32, usize)> {
        match self.entries.get(&objid) {
            Some(XRefEntry::Compressed { container, index }) if genno == 0 => {
                Some((*container, *index))
            }
            _ => None,
        }
    }

    /// Object numbers listed in this section, ascending.
    pub fn objids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn int_field(&self, key: &str) -> Option<usize> {
        self.trailer
            .get(key)
            .and_then(|v| v.as_int().ok())
            .and_then(|n| usize::try_from(n).ok())
    }
}

/// Entry-point metadata for a document session.
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    pub root: PDFObjRef,
    pub info: Option<PDFObjRef>,
    /// Merged trailer dictionary; newer sections take precedence.
    pub attrs: HashMap<String, PDFObject>,
    /// Index sections, newest first.
    pub xrefs: Vec<XRefSection>,
}

/// `%PDF-x.y` stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: String,
    /// Offset of the `%` of the stamp.
    pub offset: usize,
    /// Offset just past the header line.
    pub body_start: usize,
}

impl Header {
    /// Locate the header within the first `window` bytes.
    pub fn find(data: &[u8], window: usize) -> Option<Self> {
        let hay = &data[..data.len().min(window)];
        let marker = b"%PDF-";
        let offset = hay.windows(marker.len()).position(|w| w == marker)?;
        let version_start = offset + marker.len();
        let version_len = data[version_start..]
            .iter()
            .position(|b| !(b.is_ascii_digit() || *b == b'.'))
            .unwrap_or(data.len() - version_start);
        let version =
            String::from_utf8_lossy(&data[version_start..version_start + version_len]).into_owned();

        let mut body_start = version_start + version_len;
        while body_start < data.len() && !matches!(data[body_start], b'\r' | b'\n') {
            body_start += 1;
        }
        if data.get(body_start) == Some(&b'\r') {
            body_start += 1;
        }
        if data.get(body_start) == Some(&b'\n') {
            body_start += 1;
        }

        Some(Self {
            version,
            offset,
            body_start,
        })
    }
}

/// Offset named by the last `startxref` in the final 1024 bytes.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let search_start = data.len().saturating_sub(1024);
    let hay = &data[search_start..];
    let at = hay
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| PdfError::SyntaxError("startxref not found".into()))?;

    let mut parser = PDFParser::new(data[search_start + at..].to_vec());
    let offset = parser.startxref()?;
    usize::try_from(offset).map_err(|_| PdfError::SyntaxError("startxref out of range".into()))
}

/// Loads index sections through the document's own parser, so streams met
/// along the way land in the registry like any other object.
pub(crate) struct XRefLoader<'a> {
    pub parser: &'a mut PDFParser,
    pub registry: &'a mut Registry,
    pub decoder: &'a dyn StreamDecoder,
}

impl XRefLoader<'_> {
    /// Follow `/Prev` and `/XRefStm` links from `start`, newest first.
    ///
    /// Failing to load the first section is an error; a broken link
    /// further down the chain just ends it.
    pub fn load_chain(&mut self, start: usize) -> Result<Vec<XRefSection>> {
        let mut sections = Vec::new();
        let mut visited = FxHashSet::default();
        let mut next = Some(start);

        while let Some(pos) = next.take() {
            if !visited.insert(pos) {
                break;
            }
            let section = match self.load_at(pos) {
                Ok(s) => s,
                Err(e) if sections.is_empty() => return Err(e),
                Err(e) => {
                    tracing::debug!(offset = pos, error = %e, "xref chain link unreadable");
                    break;
                }
            };

            let hybrid = section.int_field("XRefStm");
            next = section.int_field("Prev");
            sections.push(section);

            if let Some(stm_pos) = hybrid
                && visited.insert(stm_pos)
            {
                match self.load_stream(stm_pos) {
                    Ok(s) => sections.push(s),
                    Err(e) => {
                        tracing::debug!(offset = stm_pos, error = %e, "XRefStm unreadable")
                    }
                }
            }
        }

        Ok(sections)
    }

    /// Classic table or cross-reference stream, whichever sits at `pos`.
    pub fn load_at(&mut self, pos: usize) -> Result<XRefSection> {
        self.parser.reset(pos);
        self.parser.maybe_spaces_or_comments();
        let start = self.parser.tell();
        let is_table = matches!(self.parser.token(), Ok(Keyword::Xref));
        if is_table {
            self.load_table(start)
        } else {
            self.load_stream(start)
        }
    }

    pub fn load_table(&mut self, pos: usize) -> Result<XRefSection> {
        self.parser.reset(pos);
        let mut section = self.parser.xref_table()?;
        self.parser.maybe_spaces_or_comments();
        match self.parser.attempt(PDFParser::trailer) {
            Ok(trailer) => section.trailer = trailer,
            Err(e) => tracing::debug!(offset = pos, error = %e, "xref table without trailer"),
        }
        Ok(section)
    }

    pub fn load_stream(&mut self, pos: usize) -> Result<XRefSection> {
        self.parser.reset(pos);
        let reference = self.parser.indirect_object(self.registry)?;
        let obj = self.registry.get(reference.objid, reference.genno)?;
        let stream = obj.as_stream()?;

        let widths = stream
            .get("W")
            .ok_or_else(|| PdfError::SyntaxError("missing W in xref stream".into()))?
            .as_array()?;
        if widths.len() != 3 {
            return Err(PdfError::SyntaxError("W must have 3 elements".into()));
        }
        let mut w = [0usize; 3];
        for (slot, value) in w.iter_mut().zip(widths) {
            *slot = usize::try_from(value.as_int()?)
                .map_err(|_| PdfError::SyntaxError("negative W entry".into()))?;
        }
        let entry_size = w[0]
            .checked_add(w[1])
            .and_then(|n| n.checked_add(w[2]))
            .ok_or_else(|| PdfError::SyntaxError("W entries too large".into()))?;
        if entry_size == 0 {
            return Err(PdfError::SyntaxError("empty xref stream rows".into()));
        }

        let size = stream
            .get("Size")
            .ok_or_else(|| PdfError::SyntaxError("missing Size in xref stream".into()))?
            .as_int()?;

        let index = match stream.get("Index") {
            Some(idx) => idx
                .as_array()?
                .chunks_exact(2)
                .map(|pair| Ok((pair[0].as_int()?, pair[1].as_int()?)))
                .collect::<Result<Vec<_>>>()?,
            None => vec![(0, size)],
        };

        let data = self.decoder.decode(stream)?;
        let mut rows = data.chunks_exact(entry_size);
        let mut section = XRefSection::default();

        'subsections: for (first, count) in index {
            for i in 0..count.max(0) {
                let Some(row) = rows.next() else {
                    break 'subsections;
                };
                let Some(objid) = first.checked_add(i) else {
                    continue 'subsections;
                };
                let Ok(objid) = u32::try_from(objid) else {
                    continue;
                };
                let (kind, rest) = row.split_at(w[0]);
                let (f1, f2) = rest.split_at(w[1]);
                let kind = if w[0] == 0 { 1 } else { be_int(kind) };
                match stream_entry(kind, be_int(f1), be_int(f2)) {
                    Some(entry) => section.insert(objid, entry),
                    None => tracing::debug!(objid, kind, "skipping xref stream row"),
                }
            }
        }

        section.trailer = stream
            .attrs
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "Length" | "Filter" | "DecodeParms" | "W" | "Index"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(section)
    }
}

/// Big-endian unsigned integer from raw bytes.
/// Decode one xref stream row. Fields that do not fit their target type
/// make the whole row unusable.
fn stream_entry(kind: u64, f1: u64, f2: u64) -> Option<XRefEntry> {
    let entry = match kind {
        0 => XRefEntry::Free {
            genno: u32::try_from(f2).ok()?,
        },
        1 => XRefEntry::InUse {
            offset: usize::try_from(f1).ok()?,
            genno: u32::try_from(f2).ok()?,
        },
        2 => XRefEntry::Compressed {
            container: u32::try_from(f1).ok()?,
            index: usize::try_from(f2).ok()?,
        },
        _ => return None,
    };
    Some(entry)
}

fn be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}
