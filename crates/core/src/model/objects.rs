//! PDF object types.
//!
//! Values are immutable once parsed. Composite values may still hold
//! [`PDFObjRef`]s; replacing those is the job of
//! [`PDFDocument::build`](crate::document::PDFDocument::build).

use crate::error::{PdfError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// A parsed PDF value.
///
/// `String` and `HexString` keep the decoded bytes; the distinction only
/// records how the value was spelled in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    /// Name without the leading slash, `#xx` escapes already decoded.
    Name(String),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Array(Vec<Self>),
    Dict(HashMap<String, Self>),
    Stream(Box<PDFStream>),
    Ref(PDFObjRef),
    /// A framed `num gen obj ... endobj`. The parser never nests these
    /// inside other values; they only appear when handed back by callers.
    Indirect(Box<IndirectObject>),
}

impl PDFObject {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn mismatch(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(self.mismatch("int")),
        }
    }

    /// Integers are widened, so callers reading boxes and widths need not
    /// care how the producer spelled the number.
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.mismatch("number")),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(self.mismatch("name")),
        }
    }

    /// Bytes of either string spelling.
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) | Self::HexString(s) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(items) => Ok(items),
            _ => Err(self.mismatch("array")),
        }
    }

    pub const fn as_dict(&self) -> Result<&HashMap<String, Self>> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(self.mismatch("dict")),
        }
    }

    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.mismatch("stream")),
        }
    }

    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(self.mismatch("ref")),
        }
    }

    /// Dictionary view of a dict or of a stream's attributes.
    pub fn attrs(&self) -> Option<&HashMap<String, Self>> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(&s.attrs),
            _ => None,
        }
    }

    /// Short kind label used in `TypeError`.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::HexString(_) => "hexstring",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
            Self::Indirect(_) => "indirect object",
        }
    }
}

/// PDF indirect object reference.
///
/// Two references are equal iff both the object number and the
/// generation match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PDFObjRef {
    pub objid: u32,
    pub genno: u32,
}

impl PDFObjRef {
    pub const fn new(objid: u32, genno: u32) -> Self {
        Self { objid, genno }
    }
}

impl fmt::Display for PDFObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.objid, self.genno)
    }
}

/// A concrete stored object plus its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub objid: u32,
    pub genno: u32,
    pub value: PDFObject,
}

impl IndirectObject {
    /// Frame `value` under `objid`/`genno`.
    ///
    /// A framed value is never itself a framed object; nested frames are
    /// collapsed to their innermost value.
    pub fn new(objid: u32, genno: u32, value: PDFObject) -> Self {
        let mut value = value;
        while let PDFObject::Indirect(inner) = value {
            value = inner.value;
        }
        Self {
            objid,
            genno,
            value,
        }
    }

    /// The reference that points at this object.
    pub const fn reference(&self) -> PDFObjRef {
        PDFObjRef::new(self.objid, self.genno)
    }
}

/// Stream dictionary plus the payload bytes between `stream` and `endstream`.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    pub attrs: HashMap<String, PDFObject>,
    /// Still filtered; decoding happens on demand.
    rawdata: Bytes,
    /// Identity of the enclosing indirect object, once known.
    pub objid: Option<u32>,
    pub genno: Option<u32>,
}

impl PDFStream {
    pub fn new(attrs: HashMap<String, PDFObject>, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            objid: None,
            genno: None,
        }
    }

    pub const fn set_objid(&mut self, objid: u32, genno: u32) {
        self.objid = Some(objid);
        self.genno = Some(genno);
    }

    /// Payload exactly as stored in the file.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Payload as a cheap clone of the shared buffer.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// `/Type` of the stream, if it is a direct name.
    pub fn type_name(&self) -> Option<&str> {
        self.get("Type").and_then(|t| t.as_name().ok())
    }
}
