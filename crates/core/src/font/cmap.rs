//! CMap program parser.
//!
//! Reads the PostScript-like body of an embedded CMap (a `ToUnicode`
//! stream or a CID CMap) and collects its codespace and mapping sections
//! into range collections. Every section kind is searched for
//! independently from the `begincmap` marker, so sections may appear in
//! any order and any number of times.

use super::ranges::{CodespaceRanges, MappedCodespaceRanges, code_from_bytes};
use crate::error::{PdfError, Result};
use crate::model::objects::PDFObject;
use crate::parser::lexer::Keyword;
use crate::parser::pdf_parser::{ObjectOrToken, PDFParser};
use bytes::Bytes;
use std::ops::{Deref, DerefMut};

/// The three families of mapping sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Cid,
    NotDef,
    Bf,
}

impl MappingKind {
    const fn range_keywords(self) -> (Keyword, Keyword) {
        match self {
            Self::Cid => (Keyword::BeginCidRange, Keyword::EndCidRange),
            Self::NotDef => (Keyword::BeginNotDefRange, Keyword::EndNotDefRange),
            Self::Bf => (Keyword::BeginBfRange, Keyword::EndBfRange),
        }
    }

    const fn char_keywords(self) -> (Keyword, Keyword) {
        match self {
            Self::Cid => (Keyword::BeginCidChar, Keyword::EndCidChar),
            Self::NotDef => (Keyword::BeginNotDefChar, Keyword::EndNotDefChar),
            Self::Bf => (Keyword::BeginBfChar, Keyword::EndBfChar),
        }
    }
}

/// A parsed CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CMap {
    pub name: Option<String>,
    pub codespace: CodespaceRanges,
    pub cid: MappedCodespaceRanges,
    pub notdef: MappedCodespaceRanges,
    pub bf: MappedCodespaceRanges,
}

impl CMap {
    /// Whether `code` lies inside a declared codespace range.
    pub fn is_valid(&self, code: i64) -> bool {
        self.codespace.contains(code)
    }

    /// CID for `code`, falling back to the NotDef mappings.
    pub fn cid(&self, code: i64) -> Option<i64> {
        self.cid.get(code).or_else(|| self.notdef.get(code))
    }

    /// Unicode text for `code` from the BF mappings. Destination values
    /// are UTF-16BE code units packed into an integer.
    pub fn unicode(&self, code: i64) -> Option<String> {
        let value = self.bf.get(code)?;
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        // Keep whole 16-bit units.
        let start = start - (bytes.len() - start) % 2;
        let units: Vec<u16> = bytes[start..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        )
    }
}

/// CMap parser built on the PDF object parser.
#[derive(Debug, Clone)]
pub struct CMapParser {
    parser: PDFParser,
}

impl Deref for CMapParser {
    type Target = PDFParser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for CMapParser {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parser
    }
}

impl CMapParser {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            parser: PDFParser::new(data),
        }
    }

    /// Advance until a `/name` object; the cursor is left on it.
    /// Returns `false` once the input is exhausted.
    pub fn skip_until_name(&mut self, name: &str) -> bool {
        self.skip_until(
            |item| matches!(item, ObjectOrToken::Object(PDFObject::Name(n)) if n == name),
        )
    }

    /// Advance until the bare keyword `token`; the cursor is left on it.
    pub fn skip_until_token(&mut self, token: &Keyword) -> bool {
        self.skip_until(|item| matches!(item, ObjectOrToken::Token(kw) if kw == token))
    }

    fn skip_until(&mut self, found: impl Fn(&ObjectOrToken) -> bool) -> bool {
        loop {
            self.maybe_spaces_or_comments();
            if self.current().is_none() {
                return false;
            }
            let state = self.get_state();
            match self.object_or_token() {
                Ok(item) if found(&item) => {
                    self.set_state(state);
                    return true;
                }
                Ok(_) => {}
                Err(_) => {
                    // Stray delimiter such as ')': step over it.
                    self.set_state(state);
                    self.advance();
                }
            }
        }
    }

    /// Value of `/CMapName`, if present.
    pub fn cmap_name(&mut self) -> Result<Option<String>> {
        if !self.skip_until_name("CMapName") {
            return Ok(None);
        }
        self.name()?;
        self.maybe_spaces_or_comments();
        self.name().map(Some)
    }

    /// Parse a complete CMap program.
    ///
    /// Expects the `/CIDInit /ProcSet findresource begin <n> dict begin`
    /// preamble. Missing sections yield empty collections.
    pub fn cmap(&mut self) -> Result<CMap> {
        self.maybe_spaces_or_comments();
        self.expected_name("CIDInit")?;
        self.maybe_spaces_or_comments();
        self.expected_name("ProcSet")?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::FindResource)?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::Begin)?;
        self.maybe_spaces_or_comments();
        self.non_negative_int()?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::Dict)?;
        self.maybe_spaces_or_comments();
        self.expected_token(Keyword::Begin)?;

        if !self.skip_until_token(&Keyword::BeginCMap) {
            return Err(PdfError::SyntaxError("begincmap not found".into()));
        }
        self.expected_token(Keyword::BeginCMap)?;
        let state = self.get_state();

        let name = self.cmap_name()?;

        self.set_state(state);
        let mut codespace = CodespaceRanges::new();
        while self.skip_until_token(&Keyword::BeginCodeSpaceRange) {
            codespace.merge(&self.codespacerange()?);
        }

        let mut cmap = CMap {
            name,
            codespace,
            ..CMap::default()
        };
        for kind in [MappingKind::Cid, MappingKind::NotDef, MappingKind::Bf] {
            let mut mapped = MappedCodespaceRanges::new();

            self.set_state(state);
            while self.skip_until_token(&kind.range_keywords().0) {
                mapped.merge(&self.mapped_codespacerange(kind)?);
            }
            self.set_state(state);
            while self.skip_until_token(&kind.char_keywords().0) {
                mapped.merge(&self.mapped_char(kind)?);
            }

            match kind {
                MappingKind::Cid => cmap.cid = mapped,
                MappingKind::NotDef => cmap.notdef = mapped,
                MappingKind::Bf => cmap.bf = mapped,
            }
        }

        Ok(cmap)
    }

    /// `begincodespacerange <lo> <hi> ... endcodespacerange`
    pub fn codespacerange(&mut self) -> Result<CodespaceRanges> {
        self.expected_token(Keyword::BeginCodeSpaceRange)?;
        self.maybe_spaces_or_comments();
        let mut res = CodespaceRanges::new();
        while self.current() == Some(b'<') {
            let from = self.code()?;
            let to = self.code()?;
            res.add(from, to);
        }
        self.expected_token(Keyword::EndCodeSpaceRange)?;
        Ok(res)
    }

    /// `begin<kind>range <lo> <hi> <dst> ... end<kind>range`
    ///
    /// A `bfrange` destination may also be an array with one destination
    /// per code.
    pub fn mapped_codespacerange(&mut self, kind: MappingKind) -> Result<MappedCodespaceRanges> {
        let (begin, end) = kind.range_keywords();
        self.expected_token(begin)?;
        self.maybe_spaces_or_comments();
        let mut res = MappedCodespaceRanges::new();
        while self.current() == Some(b'<') {
            let from = self.code()?;
            let to = self.code()?;
            if self.current() == Some(b'[') {
                let PDFObject::Array(items) = self.array()? else {
                    return Err(PdfError::token(self.tell(), "expected destination array"));
                };
                self.maybe_spaces_or_comments();
                for (code, item) in (from..=to).zip(&items) {
                    match item {
                        PDFObject::HexString(b) | PDFObject::String(b) => match code_from_bytes(b) {
                            Some(dst) => res.add(code, code, dst),
                            None => tracing::debug!(code, len = b.len(), "bfrange destination too long"),
                        },
                        PDFObject::Int(n) => res.add(code, code, *n),
                        other => tracing::debug!(code, kind = other.type_name(), "skipping bfrange destination"),
                    }
                }
            } else {
                let dst = self.destination()?;
                res.add(from, to, dst);
            }
        }
        self.expected_token(end)?;
        Ok(res)
    }

    /// `begin<kind>char <code> <dst> ... end<kind>char`, each entry stored
    /// as a one-code range.
    pub fn mapped_char(&mut self, kind: MappingKind) -> Result<MappedCodespaceRanges> {
        let (begin, end) = kind.char_keywords();
        self.expected_token(begin)?;
        self.maybe_spaces_or_comments();
        let mut res = MappedCodespaceRanges::new();
        while self.current() == Some(b'<') {
            let code = self.code()?;
            let dst = self.destination()?;
            res.add(code, code, dst);
        }
        self.expected_token(end)?;
        Ok(res)
    }

    /// A hex string operand as an integer code.
    fn code(&mut self) -> Result<i64> {
        let pos = self.tell();
        let bytes = self.hexstring()?;
        self.maybe_spaces_or_comments();
        code_from_bytes(&bytes).ok_or_else(|| {
            PdfError::token(pos, format!("{}-byte operand does not fit a code", bytes.len()))
        })
    }

    /// A destination: hex string or integer.
    fn destination(&mut self) -> Result<i64> {
        if self.current() == Some(b'<') {
            return self.code();
        }
        let pos = self.tell();
        let value = self.non_negative_int()?;
        self.maybe_spaces_or_comments();
        i64::try_from(value).map_err(|_| PdfError::token(pos, "destination out of range"))
    }
}
