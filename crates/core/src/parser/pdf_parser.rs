//! PDF object parser - a backtrackable cursor producing PDF values.
//!
//! Every value-producing method either returns a value and leaves the cursor
//! just past it, or fails with a parse error and leaves the cursor somewhere
//! undefined. Callers that want to try an alternative take a
//! [`ParserState`] snapshot first and restore it on failure.

use super::lexer::{Keyword, Lexer, Number};
use crate::document::registry::Registry;
use crate::document::xref::{XRefEntry, XRefSection};
use crate::error::{PdfError, Result};
use crate::model::objects::{IndirectObject, PDFObjRef, PDFObject, PDFStream};
use bytes::Bytes;
use std::collections::HashMap;

/// Opaque cursor snapshot. Restoring it puts the parser back exactly where
/// it was; the underlying bytes never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserState {
    pos: usize,
}

impl ParserState {
    /// Byte offset this snapshot points at.
    pub const fn offset(&self) -> usize {
        self.pos
    }
}

/// Result of a lenient scan step: a parsed object or a bare keyword.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOrToken {
    Object(PDFObject),
    Token(Keyword),
}

/// A top-level element of the file body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyElement {
    /// An indirect object; it has already been registered.
    Object(PDFObjRef),
    /// A classic cross-reference table (without its trailer).
    XRef(XRefSection),
    /// A `trailer` dictionary.
    Trailer(HashMap<String, PDFObject>),
    /// A `startxref` offset.
    StartXref(u64),
}

/// PDF Parser - parses PDF object syntax over a shared byte buffer.
#[derive(Debug, Clone)]
pub struct PDFParser {
    lexer: Lexer,
}

impl PDFParser {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            lexer: Lexer::new(data),
        }
    }

    /// Underlying buffer.
    pub fn bytes(&self) -> &Bytes {
        self.lexer.bytes()
    }

    /// Lookahead byte, `None` once the input is exhausted.
    pub fn current(&self) -> Option<u8> {
        self.lexer.current()
    }

    pub fn advance(&mut self) -> Option<u8> {
        self.lexer.advance()
    }

    pub fn prev(&mut self) {
        self.lexer.prev();
    }

    pub const fn tell(&self) -> usize {
        self.lexer.tell()
    }

    /// Move the cursor to an absolute byte offset.
    pub fn reset(&mut self, offset: usize) {
        self.lexer.set_pos(offset);
    }

    pub const fn get_state(&self) -> ParserState {
        ParserState {
            pos: self.lexer.tell(),
        }
    }

    pub fn set_state(&mut self, state: ParserState) {
        self.lexer.set_pos(state.pos);
    }

    /// Get remaining unparsed data.
    pub fn remaining(&self) -> &[u8] {
        self.lexer.remaining()
    }

    pub fn maybe_spaces_or_comments(&mut self) {
        self.lexer.skip_whitespace();
    }

    /// Run `f`, restoring the cursor if it fails.
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let state = self.get_state();
        let result = f(self);
        if result.is_err() {
            self.set_state(state);
        }
        result
    }

    /// Integer or real number.
    pub fn numeric(&mut self) -> Result<PDFObject> {
        Ok(match self.lexer.read_number()? {
            Number::Int(n) => PDFObject::Int(n),
            Number::Real(n) => PDFObject::Real(n),
        })
    }

    pub fn non_negative_int(&mut self) -> Result<u64> {
        self.lexer.read_unsigned()
    }

    pub fn boolean(&mut self) -> Result<PDFObject> {
        let pos = self.tell();
        match self.token()? {
            Keyword::True => Ok(PDFObject::Bool(true)),
            Keyword::False => Ok(PDFObject::Bool(false)),
            _ => Err(PdfError::token(pos, "expected boolean")),
        }
    }

    pub fn null(&mut self) -> Result<PDFObject> {
        let pos = self.tell();
        match self.token()? {
            Keyword::Null => Ok(PDFObject::Null),
            _ => Err(PdfError::token(pos, "expected null")),
        }
    }

    pub fn name(&mut self) -> Result<String> {
        self.lexer.read_name()
    }

    /// Literal string `( ... )`.
    pub fn string(&mut self) -> Result<PDFObject> {
        Ok(PDFObject::String(self.lexer.read_string()?))
    }

    /// Hex string `< ... >`, as raw bytes.
    pub fn hexstring(&mut self) -> Result<Vec<u8>> {
        self.lexer.read_hex_string()
    }

    pub fn array(&mut self) -> Result<PDFObject> {
        if self.current() != Some(b'[') {
            return Err(PdfError::token(self.tell(), "expected '['"));
        }
        self.advance();
        let mut arr = Vec::new();
        loop {
            self.maybe_spaces_or_comments();
            match self.current() {
                Some(b']') => {
                    self.advance();
                    return Ok(PDFObject::Array(arr));
                }
                None => return Err(PdfError::UnexpectedEof),
                Some(_) => arr.push(self.object()?),
            }
        }
    }

    pub fn dictionary(&mut self) -> Result<HashMap<String, PDFObject>> {
        if !self.lexer.starts_with(b"<<") {
            return Err(PdfError::token(self.tell(), "expected '<<'"));
        }
        self.reset(self.tell() + 2);
        let mut dict = HashMap::new();
        loop {
            self.maybe_spaces_or_comments();
            if self.lexer.starts_with(b">>") {
                self.reset(self.tell() + 2);
                return Ok(dict);
            }
            match self.current() {
                None => return Err(PdfError::UnexpectedEof),
                Some(b'/') => {}
                Some(_) => {
                    return Err(PdfError::token(self.tell(), "expected name as dict key"));
                }
            }
            let key = self.name()?;
            self.maybe_spaces_or_comments();
            let value = self.object()?;
            dict.insert(key, value);
        }
    }

    /// `num gen R`
    pub fn indirect_reference(&mut self) -> Result<PDFObjRef> {
        let (objid, genno) = self.object_id()?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::R)?;
        Ok(PDFObjRef::new(objid, genno))
    }

    /// Any direct object. Streams are only recognised inside
    /// [`indirect_object`](Self::indirect_object).
    pub fn object(&mut self) -> Result<PDFObject> {
        match self.current() {
            None => Err(PdfError::UnexpectedEof),
            Some(b'/') => Ok(PDFObject::Name(self.name()?)),
            Some(b'(') => self.string(),
            Some(b'<') if self.lexer.peek_at(1) == Some(b'<') => {
                Ok(PDFObject::Dict(self.dictionary()?))
            }
            Some(b'<') => Ok(PDFObject::HexString(self.hexstring()?)),
            Some(b'[') => self.array(),
            Some(b'0'..=b'9') => match self.attempt(Self::indirect_reference) {
                Ok(r) => Ok(PDFObject::Ref(r)),
                Err(_) => self.numeric(),
            },
            Some(b'+' | b'-' | b'.') => self.numeric(),
            Some(b't' | b'f') => self.boolean(),
            Some(b'n') => self.null(),
            Some(b) => Err(PdfError::token(
                self.tell(),
                format!("unexpected byte {:?}", b as char),
            )),
        }
    }

    /// A bare keyword.
    pub fn token(&mut self) -> Result<Keyword> {
        self.lexer.read_keyword()
    }

    pub fn expected_token(&mut self, expected: Keyword) -> Result<()> {
        let pos = self.tell();
        let kw = self.token()?;
        if kw == expected {
            Ok(())
        } else {
            Err(PdfError::token(
                pos,
                format!(
                    "expected {:?}, got {:?}",
                    String::from_utf8_lossy(expected.as_bytes()),
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            ))
        }
    }

    pub fn expected_name(&mut self, expected: &str) -> Result<()> {
        let pos = self.tell();
        let name = self.name()?;
        if name == expected {
            Ok(())
        } else {
            Err(PdfError::token(
                pos,
                format!("expected /{}, got /{}", expected, name),
            ))
        }
    }

    /// Parse an object, falling back to a bare keyword.
    pub fn object_or_token(&mut self) -> Result<ObjectOrToken> {
        match self.attempt(Self::object) {
            Ok(obj) => Ok(ObjectOrToken::Object(obj)),
            Err(_) => Ok(ObjectOrToken::Token(self.token()?)),
        }
    }

    /// Stream payload following an already-parsed dictionary.
    ///
    /// The declared `/Length` is used when it is a direct integer or a
    /// reference to an object already in `registry`, and only if
    /// `endstream` really follows it. Otherwise the payload runs up to the
    /// next `endstream`.
    pub fn stream(
        &mut self,
        attrs: HashMap<String, PDFObject>,
        registry: &Registry,
    ) -> Result<PDFStream> {
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::Stream)?;
        self.lexer.skip_eol();
        let start = self.tell();
        let total = self.lexer.len();

        let declared = match attrs.get("Length") {
            Some(PDFObject::Int(n)) => Some(*n),
            Some(PDFObject::Ref(r)) => registry
                .get_shared(r.objid, r.genno)
                .and_then(|v| v.as_int().ok()),
            _ => None,
        };

        let trusted = declared
            .and_then(|len| usize::try_from(len).ok())
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= total && self.endstream_follows(end));

        let end = match trusted {
            Some(end) => end,
            None => {
                let marker = self
                    .lexer
                    .find(b"endstream", start)
                    .ok_or_else(|| PdfError::SyntaxError("unterminated stream".into()))?;
                trim_eol(self.lexer.bytes(), start, marker)
            }
        };

        let rawdata = self.lexer.bytes().slice(start..end);
        self.reset(end);
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::EndStream)?;
        Ok(PDFStream::new(attrs, rawdata))
    }

    fn endstream_follows(&mut self, end: usize) -> bool {
        let state = self.get_state();
        self.reset(end);
        self.maybe_spaces_or_comments();
        let found = self.lexer.starts_with(b"endstream");
        self.set_state(state);
        found
    }

    /// `num gen obj <value> endobj`, composing dictionary + `stream` into a
    /// stream value. A missing `endobj` is tolerated.
    pub fn parse_indirect_object(&mut self, registry: &Registry) -> Result<IndirectObject> {
        let (objid, genno) = self.object_id()?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::Obj)?;
        self.maybe_spaces_or_comments();

        let value = match self.object()? {
            PDFObject::Dict(attrs) => {
                let state = self.get_state();
                self.maybe_spaces_or_comments();
                if self.lexer.starts_with(b"stream") {
                    let mut stream = self.stream(attrs, registry)?;
                    stream.set_objid(objid, genno);
                    PDFObject::Stream(Box::new(stream))
                } else {
                    self.set_state(state);
                    PDFObject::Dict(attrs)
                }
            }
            other => other,
        };

        let state = self.get_state();
        self.maybe_spaces_or_comments();
        if self.attempt(|p| p.expected_token(Keyword::EndObj)).is_err() {
            tracing::debug!(objid, genno, offset = state.offset(), "missing endobj");
            self.set_state(state);
        }
        Ok(IndirectObject::new(objid, genno, value))
    }

    /// Parse an indirect object and register it. The parsed object names
    /// its own identity, so the registry key comes from the source itself.
    pub fn indirect_object(&mut self, registry: &mut Registry) -> Result<PDFObjRef> {
        let obj = self.parse_indirect_object(registry)?;
        let reference = obj.reference();
        registry.register(obj);
        Ok(reference)
    }

    /// Classic `xref` table, up to (not including) `trailer`.
    pub fn xref_table(&mut self) -> Result<XRefSection> {
        self.expected_token(Keyword::Xref)?;
        let mut section = XRefSection::default();
        loop {
            self.maybe_spaces_or_comments();
            if !matches!(self.current(), Some(b'0'..=b'9')) {
                return Ok(section);
            }
            let mut base = self.non_negative_int()?;
            self.maybe_spaces_or_comments();
            let count = self.non_negative_int()?;

            for i in 0..count {
                self.maybe_spaces_or_comments();
                let offset = self.non_negative_int()?;
                self.maybe_spaces_or_comments();
                let genno = self.non_negative_int()?;
                self.maybe_spaces_or_comments();
                let pos = self.tell();
                let marker = self.token()?;

                // Some writers start a subsection at 1 but still emit the
                // object 0 free row first.
                if i == 0 && base > 0 && marker.as_bytes() == b"f" && offset == 0 && genno == 65535 {
                    base -= 1;
                }
                let entry = match marker.as_bytes() {
                    b"n" => usize::try_from(offset)
                        .ok()
                        .zip(u32::try_from(genno).ok())
                        .map(|(offset, genno)| XRefEntry::InUse { offset, genno }),
                    b"f" => u32::try_from(genno)
                        .ok()
                        .map(|genno| XRefEntry::Free { genno }),
                    other => {
                        return Err(PdfError::token(
                            pos,
                            format!("bad xref marker {:?}", String::from_utf8_lossy(other)),
                        ));
                    }
                };
                let objid = base.checked_add(i).and_then(|n| u32::try_from(n).ok());
                match (objid, entry) {
                    (Some(objid), Some(entry)) => section.insert(objid, entry),
                    _ => tracing::debug!(offset = pos, "xref row out of range, skipped"),
                }
            }
        }
    }

    /// `trailer << ... >>`
    pub fn trailer(&mut self) -> Result<HashMap<String, PDFObject>> {
        self.expected_token(Keyword::Trailer)?;
        self.maybe_spaces_or_comments();
        self.dictionary()
    }

    /// `startxref <offset>`
    pub fn startxref(&mut self) -> Result<u64> {
        self.expected_token(Keyword::StartXref)?;
        self.maybe_spaces_or_comments();
        self.non_negative_int()
    }

    /// Next top-level element of the body: an indirect object, an xref
    /// table, a trailer, or a startxref marker.
    pub fn body_element(&mut self, registry: &mut Registry) -> Result<BodyElement> {
        self.maybe_spaces_or_comments();
        if matches!(self.current(), Some(b) if b.is_ascii_alphabetic()) {
            let state = self.get_state();
            let kw = self.token()?;
            self.set_state(state);
            match kw {
                Keyword::Xref => return Ok(BodyElement::XRef(self.xref_table()?)),
                Keyword::Trailer => return Ok(BodyElement::Trailer(self.trailer()?)),
                Keyword::StartXref => return Ok(BodyElement::StartXref(self.startxref()?)),
                _ => {}
            }
        }
        Ok(BodyElement::Object(self.indirect_object(registry)?))
    }

    fn object_id(&mut self) -> Result<(u32, u32)> {
        let pos = self.tell();
        let objid = self.non_negative_int()?;
        self.maybe_spaces_or_comments();
        let genno = self.non_negative_int()?;
        match (u32::try_from(objid), u32::try_from(genno)) {
            (Ok(objid), Ok(genno)) => Ok((objid, genno)),
            _ => Err(PdfError::token(pos, "object identity out of range")),
        }
    }
}

/// End of a stream payload that runs up to `marker`, dropping the single
/// end-of-line that precedes `endstream`.
fn trim_eol(data: &[u8], start: usize, marker: usize) -> usize {
    let mut end = marker;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}
