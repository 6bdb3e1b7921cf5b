//! Byte-level cursor and PostScript-style primitive scanning.
//!
//! The lexer owns a shared, immutable byte buffer and a single position.
//! Everything above it (objects, streams, CMap sections) is built in
//! `pdf_parser` out of the primitives here.

use crate::error::{PdfError, Result};
use bytes::Bytes;

/// Bare keywords the parsers care about. Anything else is preserved
/// verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Structural
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    BraceOpen,  // {
    BraceClose, // }

    // Primitives
    True,
    False,
    Null,

    // Object structure
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,

    // CMap structure
    BeginCMap,
    EndCMap,
    UseCMap,
    BeginCodeSpaceRange,
    EndCodeSpaceRange,
    BeginBfChar,
    EndBfChar,
    BeginBfRange,
    EndBfRange,
    BeginCidChar,
    EndCidChar,
    BeginCidRange,
    EndCidRange,
    BeginNotDefChar,
    EndNotDefChar,
    BeginNotDefRange,
    EndNotDefRange,

    // PostScript resource plumbing around CMaps
    Begin,
    End,
    Def,
    Dict,
    Pop,
    CurrentDict,
    FindResource,
    DefineResource,

    // Unknown (preserves original bytes)
    Unknown(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Keyword::ArrayStart,
            b"]" => Keyword::ArrayEnd,
            b"<<" => Keyword::DictStart,
            b">>" => Keyword::DictEnd,
            b"{" => Keyword::BraceOpen,
            b"}" => Keyword::BraceClose,

            b"true" => Keyword::True,
            b"false" => Keyword::False,
            b"null" => Keyword::Null,

            b"obj" => Keyword::Obj,
            b"endobj" => Keyword::EndObj,
            b"R" => Keyword::R,
            b"stream" => Keyword::Stream,
            b"endstream" => Keyword::EndStream,
            b"xref" => Keyword::Xref,
            b"trailer" => Keyword::Trailer,
            b"startxref" => Keyword::StartXref,

            b"begincmap" => Keyword::BeginCMap,
            b"endcmap" => Keyword::EndCMap,
            b"usecmap" => Keyword::UseCMap,
            b"begincodespacerange" => Keyword::BeginCodeSpaceRange,
            b"endcodespacerange" => Keyword::EndCodeSpaceRange,
            b"beginbfchar" => Keyword::BeginBfChar,
            b"endbfchar" => Keyword::EndBfChar,
            b"beginbfrange" => Keyword::BeginBfRange,
            b"endbfrange" => Keyword::EndBfRange,
            b"begincidchar" => Keyword::BeginCidChar,
            b"endcidchar" => Keyword::EndCidChar,
            b"begincidrange" => Keyword::BeginCidRange,
            b"endcidrange" => Keyword::EndCidRange,
            b"beginnotdefchar" => Keyword::BeginNotDefChar,
            b"endnotdefchar" => Keyword::EndNotDefChar,
            b"beginnotdefrange" => Keyword::BeginNotDefRange,
            b"endnotdefrange" => Keyword::EndNotDefRange,

            b"begin" => Keyword::Begin,
            b"end" => Keyword::End,
            b"def" => Keyword::Def,
            b"dict" => Keyword::Dict,
            b"pop" => Keyword::Pop,
            b"currentdict" => Keyword::CurrentDict,
            b"findresource" => Keyword::FindResource,
            b"defineresource" => Keyword::DefineResource,

            _ => Keyword::Unknown(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Keyword::ArrayStart => b"[",
            Keyword::ArrayEnd => b"]",
            Keyword::DictStart => b"<<",
            Keyword::DictEnd => b">>",
            Keyword::BraceOpen => b"{",
            Keyword::BraceClose => b"}",
            Keyword::True => b"true",
            Keyword::False => b"false",
            Keyword::Null => b"null",
            Keyword::Obj => b"obj",
            Keyword::EndObj => b"endobj",
            Keyword::R => b"R",
            Keyword::Stream => b"stream",
            Keyword::EndStream => b"endstream",
            Keyword::Xref => b"xref",
            Keyword::Trailer => b"trailer",
            Keyword::StartXref => b"startxref",
            Keyword::BeginCMap => b"begincmap",
            Keyword::EndCMap => b"endcmap",
            Keyword::UseCMap => b"usecmap",
            Keyword::BeginCodeSpaceRange => b"begincodespacerange",
            Keyword::EndCodeSpaceRange => b"endcodespacerange",
            Keyword::BeginBfChar => b"beginbfchar",
            Keyword::EndBfChar => b"endbfchar",
            Keyword::BeginBfRange => b"beginbfrange",
            Keyword::EndBfRange => b"endbfrange",
            Keyword::BeginCidChar => b"begincidchar",
            Keyword::EndCidChar => b"endcidchar",
            Keyword::BeginCidRange => b"begincidrange",
            Keyword::EndCidRange => b"endcidrange",
            Keyword::BeginNotDefChar => b"beginnotdefchar",
            Keyword::EndNotDefChar => b"endnotdefchar",
            Keyword::BeginNotDefRange => b"beginnotdefrange",
            Keyword::EndNotDefRange => b"endnotdefrange",
            Keyword::Begin => b"begin",
            Keyword::End => b"end",
            Keyword::Def => b"def",
            Keyword::Dict => b"dict",
            Keyword::Pop => b"pop",
            Keyword::CurrentDict => b"currentdict",
            Keyword::FindResource => b"findresource",
            Keyword::DefineResource => b"defineresource",
            Keyword::Unknown(bytes) => bytes.as_slice(),
        }
    }
}

impl PartialEq<[u8]> for Keyword {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Keyword {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

/// Integer or real literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

/// PDF whitespace, including NUL and form feed.
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Regular characters make up names, numbers and keywords.
pub const fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Cursor over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct Lexer {
    data: Bytes,
    pos: usize,
}

impl Lexer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Underlying buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte offset of the cursor.
    pub const fn tell(&self) -> usize {
        self.pos
    }

    /// Move the cursor, clamped to the buffer length.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Lookahead byte, `None` at end of input.
    pub fn current(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Byte `offset` positions past the cursor.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    /// Advance position by one, returning the byte stepped over.
    pub fn advance(&mut self) -> Option<u8> {
        let b = self.current()?;
        self.pos += 1;
        Some(b)
    }

    /// Step back by one.
    pub fn prev(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.remaining().starts_with(needle)
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        let data = &self.data;
        while self.pos < data.len() {
            let b = data[self.pos];
            if b == b'%' {
                self.pos += 1;
                match find_line_end(&data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = data.len(),
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Consume a single end-of-line marker (`\r\n`, `\n` or `\r`).
    pub fn skip_eol(&mut self) {
        if self.current() == Some(b'\r') {
            self.pos += 1;
        }
        if self.current() == Some(b'\n') {
            self.pos += 1;
        }
    }

    /// `/Name` with `#xx` escapes decoded; the slash is not included.
    pub fn read_name(&mut self) -> Result<String> {
        if self.current() != Some(b'/') {
            return Err(PdfError::token(self.pos, "expected '/'"));
        }
        self.pos += 1;
        let mut name = Vec::new();

        while let Some(b) = self.current() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                if let (Some(c1), Some(c2)) = (self.peek_at(1), self.peek_at(2))
                    && let (Some(h), Some(l)) = (hex_value(c1), hex_value(c2))
                {
                    self.pos += 3;
                    name.push((h << 4) | l);
                    continue;
                }
                // Invalid hex escape: '#' is dropped, following chars kept
                self.pos += 1;
            } else {
                name.push(b);
                self.pos += 1;
            }
        }

        Ok(name_from_bytes(&name))
    }

    /// Signed integer or real. A bare sign is rejected and the cursor restored.
    pub fn read_number(&mut self) -> Result<Number> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0usize;

        if matches!(self.current(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }

        while let Some(b) = self.current() {
            if b.is_ascii_digit() {
                digits += 1;
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        if digits == 0 {
            self.pos = start;
            return Err(PdfError::token(start, "expected number"));
        }

        let s = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| PdfError::token(start, "invalid number"))?;

        if has_dot {
            let val: f64 = s
                .parse()
                .map_err(|_| PdfError::token(start, format!("invalid real: {}", s)))?;
            Ok(Number::Real(val))
        } else {
            let val: i64 = s
                .parse()
                .map_err(|_| PdfError::token(start, format!("invalid int: {}", s)))?;
            Ok(Number::Int(val))
        }
    }

    /// Read an unsigned decimal integer with no sign or fraction.
    pub fn read_unsigned(&mut self) -> Result<u64> {
        let start = self.pos;
        while matches!(self.current(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(PdfError::token(start, "expected non-negative integer"));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PdfError::token(start, "integer out of range"))
    }

    /// Balanced `(...)` string with backslash escapes applied.
    pub fn read_string(&mut self) -> Result<Vec<u8>> {
        if self.current() != Some(b'(') {
            return Err(PdfError::token(self.pos, "expected '('"));
        }
        self.pos += 1;
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'(') => result.push(b'('),
                    Some(b')') => result.push(b')'),
                    Some(b'\\') => result.push(b'\\'),
                    Some(b'\r') => {
                        // Line continuation
                        if self.current() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(c) if (b'0'..b'8').contains(&c) => {
                        let mut octal = (c - b'0') as u32;
                        for _ in 0..2 {
                            match self.current() {
                                Some(d) if (b'0'..b'8').contains(&d) => {
                                    self.pos += 1;
                                    octal = octal * 8 + (d - b'0') as u32;
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(result)
    }

    /// `<...>` string. Whitespace between digits is ignored.
    pub fn read_hex_string(&mut self) -> Result<Vec<u8>> {
        if self.current() != Some(b'<') || self.peek_at(1) == Some(b'<') {
            return Err(PdfError::token(self.pos, "expected '<'"));
        }
        self.pos += 1;
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.current() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if is_whitespace(c) => self.pos += 1,
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| {
                        PdfError::token(self.pos, format!("invalid hex digit {:?}", c as char))
                    })?;
                    self.pos += 1;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        // Odd digit count: the final digit is padded with 0
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(result)
    }

    /// Read a bare keyword. Single delimiters that cannot start an object
    /// (`[`, `]`, `{`, `}`, `<<`, `>>`) are keywords too.
    pub fn read_keyword(&mut self) -> Result<Keyword> {
        let start = self.pos;
        match self.current() {
            None => return Err(PdfError::UnexpectedEof),
            Some(b'[' | b']' | b'{' | b'}') => {
                self.pos += 1;
                return Ok(Keyword::from_bytes(&self.data[start..self.pos]));
            }
            Some(b'<') if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                return Ok(Keyword::DictStart);
            }
            Some(b'>') if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                return Ok(Keyword::DictEnd);
            }
            Some(b) if !is_regular(b) => {
                return Err(PdfError::token(
                    start,
                    format!("expected keyword, got {:?}", b as char),
                ));
            }
            Some(_) => {}
        }
        let len = self.remaining().iter().position(|&b| !is_regular(b));
        self.pos = match len {
            Some(n) => start + n,
            None => self.data.len(),
        };
        Ok(Keyword::from_bytes(&self.data[start..self.pos]))
    }

    /// Position of the first occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() || from >= self.data.len() {
            return None;
        }
        self.data[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| from + p)
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

/// Names are decoded byte-per-char (Latin-1), so any byte sequence survives.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
